//! Decision auditing and observation.
//!
//! Every classification decision is logged with structured fields via
//! `tracing` and, when a sink is attached, handed to an external observer
//! (a UI or a statistics task). Delivery to the observer is best effort:
//! it never blocks the connection and never fails it.

use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, trace};

/// How the proxy handles a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMode {
    /// CONNECT tunnel (opaque byte relay)
    Connect,
    /// Absolute-form HTTP request rewritten to origin form
    Forward,
}

impl fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyMode::Connect => write!(f, "connect"),
            ProxyMode::Forward => write!(f, "forward"),
        }
    }
}

/// One classification decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterEvent {
    /// Request target exactly as the client sent it
    pub url: String,
    /// Whether the request was denied
    pub blocked: bool,
    /// Time spent classifying
    pub elapsed: Duration,
}

/// Receiver of classification decisions.
///
/// Implementations must return promptly; `notify` runs on the connection path.
pub trait ObservationSink: Send + Sync {
    /// Record a decision.
    fn notify(&self, event: FilterEvent);
}

/// Sink that forwards events over a bounded channel, dropping them when the
/// receiver falls behind or has gone away.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<FilterEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<FilterEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ObservationSink for ChannelSink {
    fn notify(&self, event: FilterEvent) {
        if let Err(e) = self.tx.try_send(event) {
            trace!("Dropped filter event: {}", e);
        }
    }
}

/// Log an allowed request.
pub fn log_allowed(mode: ProxyMode, target: &str, elapsed: Duration) {
    info!(
        target: "guardian_proxy::audit",
        mode = %mode,
        url = target,
        decision = "allow",
        elapsed_us = elapsed.as_micros() as u64,
        "proxy request allowed"
    );
}

/// Log a denied request.
pub fn log_denied(mode: ProxyMode, target: &str, elapsed: Duration) {
    info!(
        target: "guardian_proxy::audit",
        mode = %mode,
        url = target,
        decision = "deny",
        elapsed_us = elapsed.as_micros() as u64,
        "proxy request denied"
    );
}
