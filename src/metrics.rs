//! Reader metrics.
//!
//! Thread-safe counters updated by the polling loop. Use
//! [`ReaderMetrics::snapshot`] (via the reader handle) to export them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters of one shard reader.
#[derive(Debug, Default)]
pub struct ReaderMetrics {
    /// Ticks that issued a query.
    polls: AtomicU64,
    /// Ticks whose query returned no rows.
    empty_polls: AtomicU64,
    /// Ticks whose query or close failed.
    failed_polls: AtomicU64,
    /// Physical log rows read.
    rows_read: AtomicU64,
    /// Logical changes delivered to the consumer.
    changes_delivered: AtomicU64,
    /// Duration of the most recent poll in milliseconds.
    last_poll_duration_ms: AtomicU64,
}

impl ReaderMetrics {
    pub(crate) fn record_poll(&self, duration: Duration, rows: usize) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.rows_read.fetch_add(rows as u64, Ordering::Relaxed);
        if rows == 0 {
            self.empty_polls.fetch_add(1, Ordering::Relaxed);
        }
        self.last_poll_duration_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_poll(&self, duration: Duration, rows: usize) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.failed_polls.fetch_add(1, Ordering::Relaxed);
        self.rows_read.fetch_add(rows as u64, Ordering::Relaxed);
        self.last_poll_duration_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_change(&self) {
        self.changes_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Export a metrics snapshot.
    pub fn snapshot(&self) -> ReaderMetricsSnapshot {
        ReaderMetricsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            failed_polls: self.failed_polls.load(Ordering::Relaxed),
            rows_read: self.rows_read.load(Ordering::Relaxed),
            changes_delivered: self.changes_delivered.load(Ordering::Relaxed),
            last_poll_duration_ms: self.last_poll_duration_ms.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a reader's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderMetricsSnapshot {
    pub polls: u64,
    pub empty_polls: u64,
    pub failed_polls: u64,
    pub rows_read: u64,
    pub changes_delivered: u64,
    pub last_poll_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_accounting() {
        let metrics = ReaderMetrics::default();
        metrics.record_poll(Duration::from_millis(12), 3);
        metrics.record_poll(Duration::from_millis(4), 0);
        metrics.record_failed_poll(Duration::from_millis(7), 1);
        metrics.record_change();

        let snap = metrics.snapshot();
        assert_eq!(snap.polls, 3);
        assert_eq!(snap.empty_polls, 1);
        assert_eq!(snap.failed_polls, 1);
        assert_eq!(snap.rows_read, 4);
        assert_eq!(snap.changes_delivered, 1);
        assert_eq!(snap.last_poll_duration_ms, 7);
    }
}
