//! Events emitted by a failover buffer.
//!
//! Every event names the `(keyspace, shard)` it happened to, because one
//! process buffers many shards through a single configuration and sinks need
//! to tell the streams apart.

use std::time::{Duration, Instant};

/// Why a BUFFERING phase stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The event source reported the shard serving again.
    FailoverEndDetected,
    /// The failover did not finish within `max_failover_duration`.
    MaxFailoverDurationExceeded,
    /// The event source reported the shard gone.
    ShardMissing,
    /// A MoveTables workflow switched traffic away from this shard.
    MoveTablesSwitchingTraffic,
    /// The buffer is shutting down.
    Shutdown,
}

impl StopReason {
    /// Stable label value for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::FailoverEndDetected => "failover_end_detected",
            StopReason::MaxFailoverDurationExceeded => "max_failover_duration_exceeded",
            StopReason::ShardMissing => "shard_missing",
            StopReason::MoveTablesSwitchingTraffic => "move_tables_switching_traffic",
            StopReason::Shutdown => "shutdown",
        }
    }
}

/// Why a buffered request was evicted before the failover ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// Evicted to free a slot for a newer request of the same shard.
    BufferFull,
    /// The request aged out of its buffering window.
    WindowExceeded,
    /// The caller's cancellation token fired while buffered.
    ContextDone,
}

impl EvictReason {
    /// Stable label value for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictReason::BufferFull => "buffer_full",
            EvictReason::WindowExceeded => "window_exceeded",
            EvictReason::ContextDone => "context_done",
        }
    }
}

/// Why a request was not buffered at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Buffering stopped less than `min_time_between_failovers` ago.
    LastFailoverTooRecent,
    /// A primary change was observed less than `min_time_between_failovers`
    /// ago.
    LastReparentTooRecent,
    /// No admission slot was free and this shard's queue was empty.
    BufferFull,
}

impl SkipReason {
    /// Stable label value for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::LastFailoverTooRecent => "last_failover_too_recent",
            SkipReason::LastReparentTooRecent => "last_reparent_too_recent",
            SkipReason::BufferFull => "buffer_full",
        }
    }
}

/// Events emitted by a shard buffer.
#[derive(Debug, Clone)]
pub enum BufferEvent {
    /// A BUFFERING phase started for this shard.
    BufferingStarted {
        /// Keyspace of the shard that started buffering.
        keyspace: String,
        /// Shard name.
        shard: String,
        /// When the phase started.
        timestamp: Instant,
        /// True if the buffer runs in dry-run mode and only observes.
        dry_run: bool,
    },
    /// A BUFFERING phase ended and the queue was handed to the drain.
    BufferingStopped {
        /// Keyspace of the shard that stopped buffering.
        keyspace: String,
        /// Shard name.
        shard: String,
        /// When the phase ended.
        timestamp: Instant,
        /// Why buffering stopped.
        reason: StopReason,
        /// How long the phase lasted.
        duration: Duration,
        /// Requests captured for the drain.
        queued: usize,
    },
    /// A request entered the queue (or would have, in dry-run mode).
    RequestBuffered {
        /// Keyspace of the buffered request's shard.
        keyspace: String,
        /// Shard name.
        shard: String,
        /// When the request was buffered.
        timestamp: Instant,
        /// Queue length after the append; always 0 in dry-run mode.
        queue_len: usize,
        /// True if the request was only counted, not actually held.
        dry_run: bool,
    },
    /// A buffered request was unblocked before the failover ended.
    RequestEvicted {
        /// Keyspace of the evicted request's shard.
        keyspace: String,
        /// Shard name.
        shard: String,
        /// When the eviction happened.
        timestamp: Instant,
        /// Why the request was evicted.
        reason: EvictReason,
    },
    /// A request bypassed the buffer entirely.
    RequestSkipped {
        /// Keyspace of the skipped request's shard.
        keyspace: String,
        /// Shard name.
        shard: String,
        /// When the skip happened.
        timestamp: Instant,
        /// Why the request was skipped.
        reason: SkipReason,
    },
    /// A drain finished releasing the captured queue.
    RequestsDrained {
        /// Keyspace of the drained shard.
        keyspace: String,
        /// Shard name.
        shard: String,
        /// When the drain finished.
        timestamp: Instant,
        /// How many requests were released.
        count: usize,
        /// How long the drain took.
        duration: Duration,
    },
}

impl BufferEvent {
    /// Short name of the event, usable as a log or metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            BufferEvent::BufferingStarted { .. } => "buffering_started",
            BufferEvent::BufferingStopped { .. } => "buffering_stopped",
            BufferEvent::RequestBuffered { .. } => "request_buffered",
            BufferEvent::RequestEvicted { .. } => "request_evicted",
            BufferEvent::RequestSkipped { .. } => "request_skipped",
            BufferEvent::RequestsDrained { .. } => "requests_drained",
        }
    }

    /// Keyspace this event belongs to.
    pub fn keyspace(&self) -> &str {
        match self {
            BufferEvent::BufferingStarted { keyspace, .. }
            | BufferEvent::BufferingStopped { keyspace, .. }
            | BufferEvent::RequestBuffered { keyspace, .. }
            | BufferEvent::RequestEvicted { keyspace, .. }
            | BufferEvent::RequestSkipped { keyspace, .. }
            | BufferEvent::RequestsDrained { keyspace, .. } => keyspace,
        }
    }

    /// Shard this event belongs to.
    pub fn shard(&self) -> &str {
        match self {
            BufferEvent::BufferingStarted { shard, .. }
            | BufferEvent::BufferingStopped { shard, .. }
            | BufferEvent::RequestBuffered { shard, .. }
            | BufferEvent::RequestEvicted { shard, .. }
            | BufferEvent::RequestSkipped { shard, .. }
            | BufferEvent::RequestsDrained { shard, .. } => shard,
        }
    }
}
