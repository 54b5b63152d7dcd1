//! HTTP CONNECT tunnel handler.
//!
//! Handles an allowed `CONNECT host:port HTTP/1.1` request by:
//! 1. Parsing the `host[:port]` target (port 443 when omitted)
//! 2. Establishing a TCP connection to the upstream
//! 3. Returning `200 Connection Established`
//! 4. Relaying bytes bidirectionally
//!
//! The proxy never terminates TLS; it just passes encrypted bytes through.

use crate::error::{ProxyError, Result};
use crate::relay;
use crate::request::{parse_connect_target, RequestLine};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

/// The complete response sent once the tunnel is open.
pub const CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Handle an allowed CONNECT request.
pub async fn handle_connect(
    line: &RequestLine,
    client: &mut TcpStream,
    io_timeout: Duration,
) -> Result<()> {
    let (host, port) = parse_connect_target(&line.target)?;
    debug!("CONNECT request to {}:{}", host, port);

    let mut upstream = connect_upstream(&host, port, io_timeout).await?;

    tokio::time::timeout(io_timeout, client.write_all(CONNECT_ESTABLISHED))
        .await
        .map_err(|_| ProxyError::RelayTimeout)??;

    let end = relay::relay(client, &mut upstream, io_timeout).await?;
    debug!("CONNECT tunnel closed for {}:{}: {:?}", host, port, end);
    Ok(())
}

/// Open a TCP connection to `host:port`.
///
/// Name resolution and the handshake together must finish within
/// `connect_timeout`.
pub async fn connect_upstream(host: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream> {
    match tokio::time::timeout(connect_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => {
            debug!("Connect to {}:{} failed: {}", host, port, e);
            Err(ProxyError::UpstreamConnect {
                host: format!("{}:{}", host, port),
                reason: e.to_string(),
            })
        }
        Err(_) => {
            debug!("Connect to {}:{} timed out", host, port);
            Err(ProxyError::UpstreamConnect {
                host: format!("{}:{}", host, port),
                reason: "connection timed out".to_string(),
            })
        }
    }
}
