//! Proxy configuration types.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Configuration for the proxy server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Bind address (default: 127.0.0.1)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// Bind port (default: 8888, 0 = OS-assigned ephemeral port)
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Size of the buffer the request head must fit into.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Timeout for the upstream connect and for every read or write while
    /// relaying.
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,

    /// How long `stop` waits for in-flight connections after cancelling them.
    /// `None` returns immediately.
    #[serde(default)]
    pub drain_timeout_ms: Option<u64>,

    /// Maximum number of idle read buffers kept for reuse.
    #[serde(default = "default_pooled_buffers")]
    pub pooled_buffers: usize,
}

impl ProxyConfig {
    /// The I/O timeout as a [`Duration`].
    #[must_use]
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    /// The drain timeout as a [`Duration`], if draining is enabled.
    #[must_use]
    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            bind_port: default_bind_port(),
            read_buffer_size: default_read_buffer_size(),
            io_timeout_secs: default_io_timeout_secs(),
            drain_timeout_ms: None,
            pooled_buffers: default_pooled_buffers(),
        }
    }
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_bind_port() -> u16 {
    8888
}

fn default_read_buffer_size() -> usize {
    512
}

fn default_io_timeout_secs() -> u64 {
    30
}

fn default_pooled_buffers() -> usize {
    64
}
