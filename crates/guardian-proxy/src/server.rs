//! Proxy server: TCP listener, connection dispatch, and lifecycle.
//!
//! The server binds to `config.bind_addr:config.bind_port`, accepts TCP
//! connections, reads the request head once, classifies the target, and
//! dispatches to the appropriate handler:
//!
//! CONNECT method -> [`connect`] tunnel
//! Other methods  -> [`forward`] rewrite and relay
//!
//! Denied requests and anything that is not a proxy request are dropped
//! without a response. Every connection runs in its own task on a
//! [`TaskTracker`] and races a shared [`CancellationToken`], so stopping
//! the server aborts in-flight relays. Draining them is opt-in through
//! `drain_timeout_ms`.

use crate::audit::{self, ProxyMode};
use crate::buffer::BufferPool;
use crate::config::ProxyConfig;
use crate::connect;
use crate::error::{ProxyError, Result};
use crate::filter::ProxyFilter;
use crate::forward;
use crate::request::{header_end, is_proxy_request, RequestLine};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Handle returned when the proxy server starts.
///
/// Dropping the handle cancels the server without waiting.
#[derive(Debug)]
pub struct ProxyHandle {
    addr: SocketAddr,
    cancel: CancellationToken,
    tracker: TaskTracker,
    drain_timeout: Option<Duration>,
}

impl ProxyHandle {
    /// The port the proxy is listening on.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The address the proxy is listening on.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal the proxy and every connection to stop. Returns immediately.
    pub fn shutdown(&self) {
        self.tracker.close();
        self.cancel.cancel();
    }

    /// Stop the proxy, waiting up to the configured drain timeout for
    /// cancelled connections to wind down.
    pub async fn stop(self) {
        self.shutdown();
        if let Some(drain) = self.drain_timeout {
            if tokio::time::timeout(drain, self.tracker.wait()).await.is_err() {
                warn!(
                    "{} proxy tasks still running after {:?} drain",
                    self.tracker.len(),
                    drain
                );
            }
        }
        info!("Proxy server on {} stopped", self.addr);
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Shared state for the proxy server.
struct ProxyState {
    filter: ProxyFilter,
    pool: Arc<BufferPool>,
    io_timeout: Duration,
}

/// Start the proxy server.
///
/// Binds the listener (port 0 = OS-assigned) and begins accepting
/// connections on the current runtime. A bind failure is returned; later
/// accept failures are logged and the loop keeps going.
pub async fn start(config: ProxyConfig, filter: ProxyFilter) -> Result<ProxyHandle> {
    let bind_addr = SocketAddr::new(config.bind_addr, config.bind_port);
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| ProxyError::Bind {
            addr: bind_addr.to_string(),
            source: e,
        })?;

    let local_addr = listener.local_addr().map_err(|e| ProxyError::Bind {
        addr: bind_addr.to_string(),
        source: e,
    })?;

    info!("Proxy server listening on {}", local_addr);

    let state = Arc::new(ProxyState {
        filter,
        pool: BufferPool::new(config.read_buffer_size, config.pooled_buffers),
        io_timeout: config.io_timeout(),
    });

    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();
    tracker.spawn(accept_loop(
        listener,
        state,
        cancel.clone(),
        tracker.clone(),
    ));

    Ok(ProxyHandle {
        addr: local_addr,
        cancel,
        tracker,
        drain_timeout: config.drain_timeout(),
    })
}

/// Accept loop: listen for connections until cancelled.
async fn accept_loop(
    listener: TcpListener,
    state: Arc<ProxyState>,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("Proxy server shutting down");
                return;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!("Accepted connection from {}", addr);
                        let state = Arc::clone(&state);
                        let cancel = cancel.clone();
                        tracker.spawn(async move {
                            let result = tokio::select! {
                                () = cancel.cancelled() => Err(ProxyError::Cancelled),
                                result = handle_connection(stream, &state) => result,
                            };
                            match result {
                                Ok(()) => {}
                                Err(e) if e.is_cancelled() => {
                                    debug!("Connection from {} cancelled", addr);
                                }
                                Err(e) => debug!("Connection handler error: {}", e),
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Accept error: {}", e);
                    }
                }
            }
        }
    }
}

/// Handle a single client connection.
///
/// The request head must fit in the first read. The pooled buffer is held
/// until the handler returns or is dropped on cancellation.
async fn handle_connection(mut stream: TcpStream, state: &ProxyState) -> Result<()> {
    let mut buf = state.pool.acquire();
    let n = tokio::time::timeout(state.io_timeout, stream.read(&mut buf))
        .await
        .map_err(|_| ProxyError::ReadTimeout)??;

    if n == 0 {
        return Ok(()); // Client disconnected
    }
    let head = &buf[..n];

    if !is_proxy_request(head) {
        return Err(ProxyError::UnknownMethod);
    }
    let line = RequestLine::parse(head)?;
    // Header bytes left unread would otherwise end up in the tunnel.
    header_end(head)?;
    let mode = if line.is_connect() {
        ProxyMode::Connect
    } else {
        ProxyMode::Forward
    };

    let decision = state.filter.check(&line.target);
    if !decision.allowed {
        audit::log_denied(mode, &line.target, decision.elapsed);
        return Err(ProxyError::Denied {
            target: line.target,
        });
    }
    audit::log_allowed(mode, &line.target, decision.elapsed);

    match mode {
        ProxyMode::Connect => connect::handle_connect(&line, &mut stream, state.io_timeout).await,
        ProxyMode::Forward => {
            forward::handle_forward(head, &line, &mut stream, state.io_timeout).await
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::audit::ChannelSink;
    use crate::connect::CONNECT_ESTABLISHED;
    use guardian::{Category, Classifier, FilterConfig, MatchStrategy};
    use tokio::io::AsyncWriteExt;

    fn test_config() -> ProxyConfig {
        ProxyConfig {
            bind_port: 0,
            io_timeout_secs: 5,
            drain_timeout_ms: Some(2_000),
            ..Default::default()
        }
    }

    fn blocking_filter(blocked: &[&str]) -> ProxyFilter {
        let classifier = Classifier::new(&FilterConfig::uniform(MatchStrategy::Trie));
        classifier.load(Category::Blacklist, blocked).unwrap();
        ProxyFilter::new(Arc::new(classifier))
    }

    /// Upstream that echoes every byte back on each accepted connection.
    async fn echo_upstream() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let (mut reader, mut writer) = stream.split();
                    let _ = tokio::io::copy(&mut reader, &mut writer).await;
                });
            }
        });
        addr
    }

    /// Send `request` and collect everything the proxy writes back.
    async fn send_and_collect(proxy: SocketAddr, request: &[u8]) -> Vec<u8> {
        let mut client = TcpStream::connect(proxy).await.unwrap();
        client.write_all(request).await.unwrap();
        let mut received = Vec::new();
        // A reset after the drop still means nothing was written.
        let _ = client.read_to_end(&mut received).await;
        received
    }

    #[tokio::test]
    async fn test_proxy_starts_and_binds() {
        let handle = start(test_config(), blocking_filter(&[])).await.unwrap();
        assert!(handle.port() > 0);
        assert_eq!(handle.local_addr().ip(), test_config().bind_addr);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = start(test_config(), blocking_filter(&[])).await.unwrap();
        let config = ProxyConfig {
            bind_port: first.port(),
            ..test_config()
        };
        let err = start(config, blocking_filter(&[])).await.unwrap_err();
        assert!(matches!(err, ProxyError::Bind { .. }));
        first.stop().await;
    }

    #[tokio::test]
    async fn test_connect_tunnel_end_to_end() {
        let upstream = echo_upstream().await;
        let handle = start(test_config(), blocking_filter(&["*.blocked.com"]))
            .await
            .unwrap();

        let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();
        let request = format!(
            "CONNECT 127.0.0.1:{} HTTP/1.1\r\nHost: 127.0.0.1:{}\r\n\r\n",
            upstream.port(),
            upstream.port()
        );
        client.write_all(request.as_bytes()).await.unwrap();

        let mut established = vec![0u8; CONNECT_ESTABLISHED.len()];
        client.read_exact(&mut established).await.unwrap();
        assert_eq!(established, CONNECT_ESTABLISHED);

        client.write_all(b"\x16\x03\x01opaque tls bytes").await.unwrap();
        let mut echoed = [0u8; 19];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"\x16\x03\x01opaque tls bytes");

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_denied_requests_get_no_bytes() {
        let handle = start(test_config(), blocking_filter(&["*.blocked.com"]))
            .await
            .unwrap();

        let connect = send_and_collect(
            handle.local_addr(),
            b"CONNECT ads.blocked.com:443 HTTP/1.1\r\nHost: ads.blocked.com\r\n\r\n",
        )
        .await;
        assert!(connect.is_empty());

        let get = send_and_collect(
            handle.local_addr(),
            b"GET http://blocked.com/pixel.gif HTTP/1.1\r\nHost: blocked.com\r\n\r\n",
        )
        .await;
        assert!(get.is_empty());

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_non_proxy_traffic_is_dropped() {
        let handle = start(test_config(), blocking_filter(&[])).await.unwrap();

        let tls = send_and_collect(handle.local_addr(), b"\x16\x03\x01\x00\xa5\x01\x00").await;
        assert!(tls.is_empty());

        let short = send_and_collect(handle.local_addr(), b"GET /\r\n\r\n").await;
        assert!(short.is_empty());

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_oversized_connect_head_is_dropped() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_port = upstream.local_addr().unwrap().port();
        let handle = start(test_config(), blocking_filter(&[])).await.unwrap();

        let request = format!(
            "CONNECT 127.0.0.1:{} HTTP/1.1\r\nUser-Agent: {}\r\n\r\n",
            upstream_port,
            "x".repeat(600)
        );
        let received = send_and_collect(handle.local_addr(), request.as_bytes()).await;
        assert!(received.is_empty());

        let accepted =
            tokio::time::timeout(Duration::from_millis(200), upstream.accept()).await;
        assert!(accepted.is_err(), "upstream should never be dialled");

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_forward_end_to_end() {
        let origin = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin_port = origin.local_addr().unwrap().port();
        let origin_task = tokio::spawn(async move {
            let (mut stream, _) = origin.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 256];
            while !received.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                assert!(n > 0);
                received.extend_from_slice(&buf[..n]);
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                .await
                .unwrap();
            received
        });

        let handle = start(test_config(), blocking_filter(&["*.blocked.com"]))
            .await
            .unwrap();
        let request = format!(
            "GET http://127.0.0.1:{}/feed?page=2 HTTP/1.1\r\nHost: 127.0.0.1\r\nAccept: */*\r\n\r\n",
            origin_port
        );
        let response = send_and_collect(handle.local_addr(), request.as_bytes()).await;
        assert_eq!(response, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok".to_vec());

        let received = origin_task.await.unwrap();
        assert_eq!(
            received,
            b"GET /feed?page=2 HTTP/1.1\r\nHost: 127.0.0.1\r\nAccept: */*\r\n\r\n".to_vec()
        );

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_connections_are_isolated() {
        let upstream = echo_upstream().await;
        let handle = start(test_config(), blocking_filter(&["*.blocked.com"]))
            .await
            .unwrap();
        let proxy = handle.local_addr();

        let clients: Vec<_> = (0..16)
            .map(|i| {
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        let mut client = TcpStream::connect(proxy).await.unwrap();
                        let request = format!("CONNECT 127.0.0.1:{} HTTP/1.1\r\n\r\n", upstream.port());
                        client.write_all(request.as_bytes()).await.unwrap();

                        let mut established = vec![0u8; CONNECT_ESTABLISHED.len()];
                        client.read_exact(&mut established).await.unwrap();
                        assert_eq!(established, CONNECT_ESTABLISHED);

                        let payload = format!("client-{:02}", i);
                        client.write_all(payload.as_bytes()).await.unwrap();
                        let mut echoed = vec![0u8; payload.len()];
                        client.read_exact(&mut echoed).await.unwrap();
                        assert_eq!(echoed, payload.as_bytes());
                    } else {
                        let request = format!("CONNECT host{}.blocked.com:443 HTTP/1.1\r\n\r\n", i);
                        let received = send_and_collect(proxy, request.as_bytes()).await;
                        assert!(received.is_empty());
                    }
                })
            })
            .collect();

        for client in clients {
            client.await.unwrap();
        }
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_decisions_reach_observer() {
        let (sink, mut events) = ChannelSink::new(8);
        let filter = blocking_filter(&["*.blocked.com"]).with_sink(Arc::new(sink));
        let handle = start(test_config(), filter).await.unwrap();

        let _ = send_and_collect(
            handle.local_addr(),
            b"CONNECT blocked.com:443 HTTP/1.1\r\n\r\n",
        )
        .await;

        let event = events.recv().await.unwrap();
        assert_eq!(event.url, "blocked.com:443");
        assert!(event.blocked);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_listener_and_tunnels() {
        let upstream = echo_upstream().await;
        let handle = start(test_config(), blocking_filter(&[])).await.unwrap();
        let proxy = handle.local_addr();

        let mut client = TcpStream::connect(proxy).await.unwrap();
        let request = format!("CONNECT 127.0.0.1:{} HTTP/1.1\r\n\r\n", upstream.port());
        client.write_all(request.as_bytes()).await.unwrap();
        let mut established = vec![0u8; CONNECT_ESTABLISHED.len()];
        client.read_exact(&mut established).await.unwrap();

        handle.stop().await;

        let mut rest = Vec::new();
        let _ = client.read_to_end(&mut rest).await;
        assert!(rest.is_empty());
        assert!(TcpStream::connect(proxy).await.is_err());
    }
}
