//! Live counters describing a running stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

#[derive(Debug)]
struct StreamStats {
    started_at: Instant,
    received: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
}

/// Shared handle to the running stream's counters.
///
/// The host engine records into it; observers (the topic logger) read
/// snapshots. Clones share the same counters.
#[derive(Debug, Clone)]
pub struct StreamSummary(Arc<StreamStats>);

/// Point-in-time view of a [`StreamSummary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SummarySnapshot {
    pub uptime_ms: u64,
    pub received: u64,
    pub processed: u64,
    pub failed: u64,
}

impl StreamSummary {
    pub fn new() -> Self {
        Self(Arc::new(StreamStats {
            started_at: Instant::now(),
            received: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }))
    }

    pub fn record_received(&self) {
        self.0.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.0.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.0.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SummarySnapshot {
        SummarySnapshot {
            uptime_ms: u64::try_from(self.0.started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            received: self.0.received.load(Ordering::Relaxed),
            processed: self.0.processed.load(Ordering::Relaxed),
            failed: self.0.failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for StreamSummary {
    fn default() -> Self {
        Self::new()
    }
}
