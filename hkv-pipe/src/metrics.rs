//! # Pipeline Metrics
//!
//! Provide lightweight counters and a batch-size histogram describing what
//! the batching loop has done: how many cycles ran, how many commands went
//! over the wire, and how well bursts coalesced.
//!
//! ## Design Principles
//! 1. **Accumulator Pattern**: Use atomic counters to aggregate events cheaply.
//! 2. **Fixed Buckets**: Keep histogram buckets in a contiguous array for cache locality.
//! 3. **Zero-Cost Access**: Expose snapshots as plain structs without heap work
//!    on the record path.
//!
//! ## Notes
//! - Only the batching loop records; producers only read snapshots.
//! - Bucket boundaries are batch sizes (commands per cycle).

use std::sync::atomic::{AtomicU64, Ordering};

/// Default batch-size bucket boundaries.
pub const DEFAULT_BATCH_BUCKETS: [u64; 10] = [1, 2, 4, 8, 16, 64, 256, 1_024, 4_096, 16_384];

/// Snapshot of all pipeline metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Batch cycles completed (one lease each).
    pub batches_total: u64,
    /// Commands sent to the backend.
    pub commands_total: u64,
    /// Barrier markers signaled.
    pub barriers_total: u64,
    /// Fire-and-forget replies read and dropped.
    pub discarded_total: u64,
    /// Commands completed with an error.
    pub command_errors_total: u64,
    /// Successful connection leases.
    pub leases_total: u64,
    /// Cycles aborted because no connection could be leased.
    pub lease_failures_total: u64,
    /// Batch-size histogram snapshot.
    pub batch_sizes: HistogramSnapshot,
}

/// Snapshot of the batch-size histogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramSnapshot {
    /// Bucket boundaries (inclusive upper bounds).
    pub bounds: Vec<u64>,
    /// Bucket counts, including the overflow bucket at the end.
    pub buckets: Vec<u64>,
    /// Total number of samples.
    pub samples: u64,
    /// Sum of all samples.
    pub sum: u64,
}

impl HistogramSnapshot {
    /// Mean sample, or 0 with no samples.
    pub fn mean(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.sum as f64 / self.samples as f64
    }
}

/// Thread-safe metrics aggregator for the batching loop.
///
/// `Ordering::Relaxed` is sufficient because we do not require cross-field
/// ordering, only eventual consistency.
pub struct Metrics {
    batches_total: AtomicU64,
    commands_total: AtomicU64,
    barriers_total: AtomicU64,
    discarded_total: AtomicU64,
    command_errors_total: AtomicU64,
    leases_total: AtomicU64,
    lease_failures_total: AtomicU64,
    batch_sizes: Histogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Creates a new metrics aggregator with the default batch buckets.
    pub fn new() -> Self {
        Metrics {
            batches_total: AtomicU64::new(0),
            commands_total: AtomicU64::new(0),
            barriers_total: AtomicU64::new(0),
            discarded_total: AtomicU64::new(0),
            command_errors_total: AtomicU64::new(0),
            leases_total: AtomicU64::new(0),
            lease_failures_total: AtomicU64::new(0),
            batch_sizes: Histogram::new(DEFAULT_BATCH_BUCKETS.to_vec()),
        }
    }

    pub fn record_lease(&self) {
        self.leases_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lease_failure(&self) {
        self.lease_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a finished cycle.
    ///
    /// **Input**: `drained` commands in the batch, `sent` of them that reached
    /// the backend.
    pub fn record_batch(&self, drained: usize, sent: usize) {
        self.batches_total.fetch_add(1, Ordering::Relaxed);
        self.commands_total.fetch_add(sent as u64, Ordering::Relaxed);
        self.batch_sizes.record(drained as u64);
    }

    pub fn record_barrier(&self) {
        self.barriers_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.discarded_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command_error(&self) {
        self.command_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters and histogram buckets.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_total: self.batches_total.load(Ordering::Relaxed),
            commands_total: self.commands_total.load(Ordering::Relaxed),
            barriers_total: self.barriers_total.load(Ordering::Relaxed),
            discarded_total: self.discarded_total.load(Ordering::Relaxed),
            command_errors_total: self.command_errors_total.load(Ordering::Relaxed),
            leases_total: self.leases_total.load(Ordering::Relaxed),
            lease_failures_total: self.lease_failures_total.load(Ordering::Relaxed),
            batch_sizes: self.batch_sizes.snapshot(),
        }
    }
}

/// Fixed-bucket histogram.
///
/// Uses a linear scan to pick buckets; the list is short and stays hot in cache.
pub struct Histogram {
    bounds: Vec<u64>,
    buckets: Vec<AtomicU64>,
    sum: AtomicU64,
    samples: AtomicU64,
}

impl Histogram {
    /// Creates a histogram with explicit bucket boundaries.
    ///
    /// **Input**: `bounds` sorted ascending.
    /// **Output**: histogram with `bounds.len() + 1` buckets (last is overflow).
    pub fn new(bounds: Vec<u64>) -> Self {
        let buckets = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Histogram {
            bounds,
            buckets,
            sum: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    /// Records one sample into the first bucket whose bound is `>= sample`,
    /// otherwise into the overflow bucket.
    pub fn record(&self, sample: u64) {
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(sample, Ordering::Relaxed);
        let idx = self
            .bounds
            .iter()
            .position(|&bound| sample <= bound)
            .unwrap_or(self.bounds.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of the histogram.
    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            bounds: self.bounds.clone(),
            buckets: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            samples: self.samples.load(Ordering::Relaxed),
            sum: self.sum.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_places_samples_and_overflow() {
        let histogram = Histogram::new(vec![1, 4, 16]);
        histogram.record(1);
        histogram.record(3);
        histogram.record(4);
        histogram.record(100);

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.buckets, vec![1, 2, 0, 1]);
        assert_eq!(snapshot.samples, 4);
        assert_eq!(snapshot.sum, 108);
        assert_eq!(snapshot.mean(), 27.0);
    }

    #[test]
    fn batch_records_sent_commands_only() {
        let metrics = Metrics::new();
        metrics.record_batch(3, 2);
        metrics.record_batch(1, 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_total, 2);
        assert_eq!(snapshot.commands_total, 2);
        assert_eq!(snapshot.batch_sizes.samples, 2);
        assert_eq!(snapshot.batch_sizes.sum, 4);
    }
}
