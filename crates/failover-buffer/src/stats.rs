//! Per-shard statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::shard::BufferState;

/// Point-in-time view of one shard buffer, for observability.
///
/// All fields are a consistent snapshot taken when the metrics were
/// retrieved; the `last_*` fields refer to the most recent (or current)
/// BUFFERING phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardStatsSnapshot {
    /// Current lifecycle state.
    pub state: BufferState,
    /// Requests currently held in the queue.
    pub queue_len: usize,
    /// BUFFERING phases started.
    pub starts: u64,
    /// BUFFERING phases stopped.
    pub stops: u64,
    /// Requests buffered over the shard's lifetime.
    pub requests_buffered: u64,
    /// Requests counted in dry-run mode over the shard's lifetime.
    pub requests_buffered_dry_run: u64,
    /// Requests released by drains.
    pub requests_drained: u64,
    /// Requests evicted before their failover ended.
    pub requests_evicted: u64,
    /// Requests that bypassed the buffer.
    pub requests_skipped: u64,
    /// Largest queue length seen during the last BUFFERING phase.
    pub last_requests_in_flight_max: u64,
    /// Requests counted during the last dry-run BUFFERING phase.
    pub last_requests_dry_run_max: u64,
    /// Duration of the last BUFFERING phase, in milliseconds.
    pub last_failover_duration_ms: u64,
    /// Sum of failover durations since the last phase start, in milliseconds.
    pub failover_duration_sum_ms: u64,
    /// Sum of per-failover peak utilization percentages.
    pub utilization_sum: u64,
    /// Dry-run equivalent of `utilization_sum`.
    pub utilization_dry_run_sum: u64,
}

#[derive(Debug, Default)]
pub(crate) struct ShardStats {
    starts: AtomicU64,
    stops: AtomicU64,
    requests_buffered: AtomicU64,
    requests_buffered_dry_run: AtomicU64,
    requests_drained: AtomicU64,
    requests_evicted: AtomicU64,
    requests_skipped: AtomicU64,
    last_requests_in_flight_max: AtomicU64,
    last_requests_dry_run_max: AtomicU64,
    last_failover_duration_ms: AtomicU64,
    failover_duration_sum_ms: AtomicU64,
    utilization_sum: AtomicU64,
    utilization_dry_run_sum: AtomicU64,
}

impl ShardStats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Resets the per-failover monitoring data and counts the start.
    pub(crate) fn record_start(&self) {
        self.last_requests_in_flight_max.store(0, Ordering::Relaxed);
        self.last_requests_dry_run_max.store(0, Ordering::Relaxed);
        self.failover_duration_sum_ms.store(0, Ordering::Relaxed);
        self.starts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_buffered(&self, queue_len: usize) {
        self.requests_buffered.fetch_add(1, Ordering::Relaxed);
        self.last_requests_in_flight_max
            .fetch_max(queue_len as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_buffered_dry_run(&self) {
        self.requests_buffered_dry_run.fetch_add(1, Ordering::Relaxed);
        self.last_requests_dry_run_max.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a stop and folds the phase's peak queue length into the
    /// utilization sums.
    pub(crate) fn record_stop(&self, duration: Duration, dry_run: bool, size: usize) {
        self.stops.fetch_add(1, Ordering::Relaxed);
        let ms = duration.as_millis() as u64;
        self.last_failover_duration_ms.store(ms, Ordering::Relaxed);
        self.failover_duration_sum_ms.fetch_add(ms, Ordering::Relaxed);

        if dry_run {
            let max = self.last_requests_dry_run_max.load(Ordering::Relaxed);
            self.utilization_dry_run_sum
                .fetch_add(max * 100 / size as u64, Ordering::Relaxed);
        } else {
            let max = self.last_requests_in_flight_max.load(Ordering::Relaxed);
            self.utilization_sum
                .fetch_add(max * 100 / size as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_drained(&self, count: usize) {
        self.requests_drained
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_evicted(&self) {
        self.requests_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.requests_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, state: BufferState, queue_len: usize) -> ShardStatsSnapshot {
        ShardStatsSnapshot {
            state,
            queue_len,
            starts: self.starts.load(Ordering::Relaxed),
            stops: self.stops.load(Ordering::Relaxed),
            requests_buffered: self.requests_buffered.load(Ordering::Relaxed),
            requests_buffered_dry_run: self.requests_buffered_dry_run.load(Ordering::Relaxed),
            requests_drained: self.requests_drained.load(Ordering::Relaxed),
            requests_evicted: self.requests_evicted.load(Ordering::Relaxed),
            requests_skipped: self.requests_skipped.load(Ordering::Relaxed),
            last_requests_in_flight_max: self.last_requests_in_flight_max.load(Ordering::Relaxed),
            last_requests_dry_run_max: self.last_requests_dry_run_max.load(Ordering::Relaxed),
            last_failover_duration_ms: self.last_failover_duration_ms.load(Ordering::Relaxed),
            failover_duration_sum_ms: self.failover_duration_sum_ms.load(Ordering::Relaxed),
            utilization_sum: self.utilization_sum.load(Ordering::Relaxed),
            utilization_dry_run_sum: self.utilization_dry_run_sum.load(Ordering::Relaxed),
        }
    }
}
