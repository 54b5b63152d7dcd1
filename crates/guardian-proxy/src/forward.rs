//! Plain HTTP forwarding.
//!
//! An allowed absolute-form request (`GET http://host/path HTTP/1.1`) is
//! rewritten to origin form and sent to the upstream together with the
//! headers and body bytes captured by the first read. The connection then
//! becomes a byte relay, so the response and any keep-alive follow-ups are
//! passed through unchanged.

use crate::connect::connect_upstream;
use crate::error::{ProxyError, Result};
use crate::relay;
use crate::request::{to_origin_form, ForwardTarget, RequestLine};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

/// Handle an allowed non-CONNECT request.
///
/// `head` is everything the client sent in its first read.
pub async fn handle_forward(
    head: &[u8],
    line: &RequestLine,
    client: &mut TcpStream,
    io_timeout: Duration,
) -> Result<()> {
    let target = ForwardTarget::parse(&line.target)?;
    let request = to_origin_form(head, line, &target.path_and_query)?;
    debug!(
        "Forwarding {} {} to {}:{}",
        line.method, target.path_and_query, target.host, target.port
    );

    let mut upstream = connect_upstream(&target.host, target.port, io_timeout).await?;

    tokio::time::timeout(io_timeout, upstream.write_all(&request))
        .await
        .map_err(|_| ProxyError::RelayTimeout)??;

    let end = relay::relay(client, &mut upstream, io_timeout).await?;
    debug!(
        "Forwarded connection to {}:{} closed: {:?}",
        target.host, target.port, end
    );
    Ok(())
}
