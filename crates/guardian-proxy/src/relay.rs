//! Bidirectional byte relay between client and upstream.
//!
//! Both directions are copied concurrently and the relay ends as soon as
//! either one finishes or fails. The other direction is dropped without
//! draining, so trailing bytes on the losing side may be lost.
//!
//! A relay with no traffic in either direction for the idle timeout is
//! aborted. A single write stalled for that long also aborts it.

use crate::error::{ProxyError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

const RELAY_BUFFER_SIZE: usize = 8 * 1024;

/// Which direction ended the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// Client closed its side; `bytes` were copied client -> upstream.
    ClientClosed { bytes: u64 },
    /// Upstream closed its side; `bytes` were copied upstream -> client.
    UpstreamClosed { bytes: u64 },
}

/// Relay bytes between `client` and `upstream` until one side closes.
pub async fn relay(
    client: &mut TcpStream,
    upstream: &mut TcpStream,
    idle_timeout: Duration,
) -> Result<RelayEnd> {
    let (mut client_read, mut client_write) = client.split();
    let (mut upstream_read, mut upstream_write) = upstream.split();
    let activity = Activity::new();

    tokio::select! {
        result = copy_half(&mut client_read, &mut upstream_write, &activity, idle_timeout) => {
            result.map(|bytes| RelayEnd::ClientClosed { bytes })
        }
        result = copy_half(&mut upstream_read, &mut client_write, &activity, idle_timeout) => {
            result.map(|bytes| RelayEnd::UpstreamClosed { bytes })
        }
        () = activity.idle_for(idle_timeout) => Err(ProxyError::RelayTimeout),
    }
}

/// Copy until EOF, recording activity. Returns the number of bytes copied.
async fn copy_half<R, W>(
    reader: &mut R,
    writer: &mut W,
    activity: &Activity,
    write_timeout: Duration,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            // Half-close so the peer sees EOF; failure here changes nothing.
            let _ = writer.shutdown().await;
            return Ok(total);
        }
        activity.touch();

        tokio::time::timeout(write_timeout, writer.write_all(&buf[..n]))
            .await
            .map_err(|_| ProxyError::RelayTimeout)??;
        activity.touch();
        total += n as u64;
    }
}

/// Time of the last transfer in either direction.
struct Activity {
    origin: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = self.origin.elapsed().as_millis() as u64;
        self.last_ms.store(elapsed, Ordering::Relaxed);
    }

    /// Resolves once nothing has been transferred for `idle`.
    async fn idle_for(&self, idle: Duration) {
        loop {
            let last = self.origin + Duration::from_millis(self.last_ms.load(Ordering::Relaxed));
            let deadline = last + idle;
            if Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep_until(deadline.into()).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (connected, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (connected.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_relay_both_directions_until_client_closes() {
        let (mut client_app, mut client_side) = tcp_pair().await;
        let (mut upstream_side, mut upstream_app) = tcp_pair().await;

        let relay_task = tokio::spawn(async move {
            relay(&mut client_side, &mut upstream_side, Duration::from_secs(5)).await
        });

        client_app.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        upstream_app.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        upstream_app.write_all(b"pong").await.unwrap();
        client_app.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        drop(client_app);
        let end = relay_task.await.unwrap().unwrap();
        assert_eq!(end, RelayEnd::ClientClosed { bytes: 4 });
    }

    #[tokio::test]
    async fn test_relay_ends_when_upstream_closes() {
        let (mut client_app, mut client_side) = tcp_pair().await;
        let (mut upstream_side, mut upstream_app) = tcp_pair().await;

        let relay_task = tokio::spawn(async move {
            relay(&mut client_side, &mut upstream_side, Duration::from_secs(5)).await
        });

        upstream_app.write_all(b"bye").await.unwrap();
        drop(upstream_app);

        let mut received = Vec::new();
        client_app.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"bye");

        let end = relay_task.await.unwrap().unwrap();
        assert_eq!(end, RelayEnd::UpstreamClosed { bytes: 3 });
    }

    #[tokio::test]
    async fn test_relay_idle_timeout() {
        let (_client_app, mut client_side) = tcp_pair().await;
        let (mut upstream_side, _upstream_app) = tcp_pair().await;

        let result = relay(&mut client_side, &mut upstream_side, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(ProxyError::RelayTimeout)));
    }
}
