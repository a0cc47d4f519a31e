//! Request buffering across shard primary failovers.
//!
//! A query router in front of a sharded database sees a burst of transient
//! errors whenever a shard's primary changes. This crate converts that burst
//! into bounded extra latency: requests that failed with a failover-looking
//! error are *stalled* per shard while the failover is in progress and
//! *drained* (released for a retry) once it resolves.
//!
//! # Lifecycle
//!
//! Each `(keyspace, shard)` pair owns a buffer that moves through three
//! states:
//!
//! - **Idle** — no failover in progress; requests pass straight through.
//! - **Buffering** — entered when a request carries a failover hint. Requests
//!   are queued up to a global admission limit and each waits at most
//!   `window`; a timeout watcher evicts aged entries and caps the whole
//!   phase at `max_failover_duration`.
//! - **Draining** — entered when the event source reports the failover over
//!   (or a cap fired). The captured queue is released with bounded
//!   parallelism, then the buffer returns to Idle.
//!
//! Two heuristics keep the buffer from thrashing: a failover hint is ignored
//! if buffering stopped, or a primary change was observed, less than
//! `min_time_between_failovers` ago.
//!
//! # Basic Example
//!
//! ```
//! use std::sync::Arc;
//! use failover_buffer::{Buffer, BufferConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(observed_err: std::io::Error) {
//! let buffer = Arc::new(Buffer::new(
//!     BufferConfig::builder()
//!         .size(100)
//!         .window(std::time::Duration::from_secs(10))
//!         .build(),
//! ));
//!
//! // A request thread observed a failover-looking error:
//! let ctx = CancellationToken::new();
//! match buffer
//!     .wait_for_failover_end(&ctx, "ks", "-80", Some(&observed_err))
//!     .await
//! {
//!     Ok(Some(retry_done)) => {
//!         // The failover ended. Retry the request, then report completion
//!         // so the admission slot is returned.
//!         retry_done.done();
//!     }
//!     Ok(None) => {
//!         // Not buffered: proceed exactly as without a buffer.
//!     }
//!     Err(_e) => {
//!         // Buffer full or evicted: surface the error.
//!     }
//! }
//! # }
//! ```
//!
//! # Example with Event Sinks
//!
//! Everything observable is emitted as a [`BufferEvent`] to the sinks
//! registered on the configuration; the `on_*` helpers cover the common
//! cases:
//!
//! ```
//! use failover_buffer::{Buffer, BufferConfig};
//!
//! let config = BufferConfig::builder()
//!     .on_buffering_started(|keyspace, shard| {
//!         println!("buffering started for {keyspace}/{shard}");
//!     })
//!     .on_buffering_stopped(|reason, duration| {
//!         println!("buffering stopped after {duration:?}: {}", reason.as_str());
//!     })
//!     .build();
//!
//! let buffer = Buffer::new(config);
//! ```
//!
//! # Feeding the event source
//!
//! The buffer consumes the event source through two interfaces: outbound, a
//! [`TopologyWatcher`] supplied via [`Buffer::with_topology`] that is told
//! "this shard is not serving" before buffering starts; inbound,
//! [`Buffer::record_keyspace_event`] which ends BUFFERING phases and tracks
//! primary changes.
//!
//! # Guarantees and non-goals
//!
//! The buffer only delays retries; it does not guarantee their success, does
//! not preserve arrival order during the drain, and holds nothing across a
//! process restart. Its one hard promise is the inverse: it never introduces
//! a failure mode — whenever it cannot help, the caller proceeds with
//! exactly the outcome it would have had without a buffer.

pub mod buffer;
pub mod config;
pub mod error;
pub mod stats;
pub mod topology;

mod entry;
mod shard;
mod timeout;

#[cfg(feature = "layer")]
pub mod layer;
#[cfg(feature = "layer")]
pub mod service;

pub use buffer::Buffer;
pub use config::{BufferConfig, BufferConfigBuilder, BufferMode, ReparentClassifier};
pub use entry::RetryDone;
pub use error::{BufferError, Result};
pub use failover_buffer_core::events::{BufferEvent, EvictReason, SkipReason, StopReason};
pub use failover_buffer_core::sink::{EventSink, EventSinks};
pub use shard::BufferState;
pub use stats::ShardStatsSnapshot;
pub use topology::{KeyspaceEvent, MoveTablesState, TopologyWatcher};

#[cfg(feature = "layer")]
pub use layer::FailoverBufferLayer;
#[cfg(feature = "layer")]
pub use service::FailoverBufferService;

/// Errors observed by callers, as the buffer sees them: failover hints and
/// classifier inputs.
pub type ObservedError = dyn std::error::Error + Send + Sync + 'static;
