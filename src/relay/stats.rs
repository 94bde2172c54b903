//! Relay counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the capture loop and the worker.
#[derive(Debug, Default)]
pub struct RelayStats {
    received: AtomicU64,
    matched: AtomicU64,
    enqueued: AtomicU64,
    dropped_queue_full: AtomicU64,
    forwarded: AtomicU64,
    dropped_too_large: AtomicU64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_matched(&self) {
        self.matched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_queue_full(&self) {
        self.dropped_queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_too_large(&self) {
        self.dropped_too_large.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped_queue_full: self.dropped_queue_full.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            dropped_too_large: self.dropped_too_large.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Frames read from the capture interface.
    pub received: u64,
    /// Frames whose IPv4 source matched the target.
    pub matched: u64,
    /// Matched frames accepted by the queue.
    pub enqueued: u64,
    /// Matched frames dropped because the queue was full.
    pub dropped_queue_full: u64,
    /// Frames handed to the link for transmission.
    pub forwarded: u64,
    /// Frames the link refused as too large.
    pub dropped_too_large: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received {} | matched {} | enqueued {} | dropped (queue full) {} | forwarded {} | dropped (too large) {}",
            self.received,
            self.matched,
            self.enqueued,
            self.dropped_queue_full,
            self.forwarded,
            self.dropped_too_large
        )
    }
}
