//! Error types for the failover buffer.

/// Errors surfaced to a caller of the buffer.
///
/// Heuristic failures never show up here: when the buffer decides it cannot
/// help, `wait_for_failover_end` returns `Ok(None)` and the caller proceeds
/// exactly as it would have without a buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// All admission slots are taken and this shard has nothing to evict;
    /// at least one other shard is consuming the whole buffer.
    #[error("buffer full: all {capacity} slots are in use by other shards")]
    BufferFull {
        /// Total admission slots configured for the process.
        capacity: usize,
    },
    /// The request was evicted from the buffer to make room for a newer
    /// request of the same shard. The caller should retry on its own.
    #[error("buffered request evicted to make room for a newer request")]
    Evicted,
    /// The caller's cancellation token fired while the request was buffered.
    #[error("request canceled while waiting for the failover to end")]
    ContextCanceled,
    /// The event source reported that the shard is gone.
    #[error("shard {keyspace}/{shard} no longer has a serving primary")]
    ShardMissing {
        /// Keyspace of the missing shard.
        keyspace: String,
        /// Shard name.
        shard: String,
    },
}

/// Result type for buffer operations.
pub type Result<T> = std::result::Result<T, BufferError>;
