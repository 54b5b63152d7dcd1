//! Request classification wrapping the [`Classifier`](guardian::Classifier).
//!
//! Times each decision and reports it to the observation sink.

use crate::audit::{FilterEvent, ObservationSink};
use guardian::Classifier;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Allow/deny policy consulted for every request target.
pub trait UrlPolicy: Send + Sync {
    /// Whether a request for `url` may proceed.
    fn is_allowed(&self, url: &str) -> bool;
}

impl UrlPolicy for Classifier {
    fn is_allowed(&self, url: &str) -> bool {
        Classifier::is_allowed(self, url)
    }
}

/// Result of a filter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Time spent classifying
    pub elapsed: Duration,
}

/// Policy plus optional observer, shared by all connections.
#[derive(Clone)]
pub struct ProxyFilter {
    policy: Arc<dyn UrlPolicy>,
    sink: Option<Arc<dyn ObservationSink>>,
}

impl ProxyFilter {
    /// Create a filter around `policy`.
    #[must_use]
    pub fn new(policy: Arc<dyn UrlPolicy>) -> Self {
        Self { policy, sink: None }
    }

    /// Attach an observer notified after every decision.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ObservationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Classify a request target.
    pub fn check(&self, url: &str) -> Decision {
        let start = Instant::now();
        let allowed = self.policy.is_allowed(url);
        let elapsed = start.elapsed();

        if let Some(sink) = &self.sink {
            sink.notify(FilterEvent {
                url: url.to_string(),
                blocked: !allowed,
                elapsed,
            });
        }

        Decision { allowed, elapsed }
    }
}

impl std::fmt::Debug for ProxyFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyFilter")
            .field("observed", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}
