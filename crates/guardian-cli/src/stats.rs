//! Running totals of classification decisions.

use guardian_proxy::FilterEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug, Default)]
pub struct DecisionStats {
    total: AtomicU64,
    blocked: AtomicU64,
}

impl DecisionStats {
    pub fn record(&self, event: &FilterEvent) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if event.blocked {
            self.blocked.fetch_add(1, Ordering::Relaxed);
        }
        trace!(
            "{} {} in {}us",
            if event.blocked { "blocked" } else { "allowed" },
            event.url,
            event.elapsed.as_micros()
        );
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn blocked(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }

    /// Record events until every sender is gone.
    pub async fn consume(&self, mut events: mpsc::Receiver<FilterEvent>) {
        while let Some(event) = events.recv().await {
            self.record(&event);
        }
    }
}
