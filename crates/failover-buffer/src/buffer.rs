//! Dispatcher routing callers and keyspace events to shard buffers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::{BufferConfig, BufferMode};
use crate::entry::RetryDone;
use crate::error::Result;
use crate::shard::{BufferState, ShardBuffer};
use crate::stats::ShardStatsSnapshot;
use crate::topology::{KeyspaceEvent, TopologyWatcher};
use crate::ObservedError;

/// Buffers write requests across primary failovers.
///
/// One instance serves the whole process: shard buffers are created lazily on
/// first reference and share a single admission semaphore sized to
/// [`BufferConfigBuilder::size`](crate::config::BufferConfigBuilder::size).
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use failover_buffer::{Buffer, BufferConfig};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(observed: std::io::Error) {
/// let buffer = Arc::new(Buffer::new(BufferConfig::builder().build()));
///
/// let ctx = CancellationToken::new();
/// match buffer
///     .wait_for_failover_end(&ctx, "ks", "-80", Some(&observed))
///     .await
/// {
///     Ok(Some(retry_done)) => {
///         // Failover over: retry the request, then return the slot.
///         retry_done.done();
///     }
///     Ok(None) => { /* not buffered, proceed */ }
///     Err(_e) => { /* buffer full or evicted, surface the error */ }
/// }
/// # }
/// ```
pub struct Buffer {
    config: Arc<BufferConfig>,
    admission: Arc<Semaphore>,
    topology: Option<Arc<dyn TopologyWatcher>>,
    shards: RwLock<HashMap<(String, String), Arc<ShardBuffer>>>,
}

impl Buffer {
    /// Creates a buffer without a topology watcher: buffering starts without
    /// the outbound "not serving" notification.
    pub fn new(config: BufferConfig) -> Self {
        Self::build(config, None)
    }

    /// Creates a buffer that notifies `topology` before every BUFFERING
    /// phase. A vetoed notification aborts the phase.
    pub fn with_topology(config: BufferConfig, topology: Arc<dyn TopologyWatcher>) -> Self {
        Self::build(config, Some(topology))
    }

    fn build(config: BufferConfig, topology: Option<Arc<dyn TopologyWatcher>>) -> Self {
        let config = Arc::new(config);
        let admission = Arc::new(Semaphore::new(config.size));
        Self {
            config,
            admission,
            topology,
            shards: RwLock::new(HashMap::new()),
        }
    }

    /// Decides whether the request should be buffered and, if so, holds it
    /// until the failover ends.
    ///
    /// `err` is the (possibly `None`) error the caller observed from its
    /// last attempt; a non-`None` value is taken as a failover hint. On
    /// `Ok(Some(token))` the caller may retry immediately and must invoke
    /// (or drop) the token when the retry has completed. On `Ok(None)` the
    /// request was not buffered and the caller proceeds as if the buffer did
    /// not exist. Errors are terminal: the caller should surface them
    /// instead of retrying through the buffer.
    pub async fn wait_for_failover_end(
        &self,
        ctx: &CancellationToken,
        keyspace: &str,
        shard: &str,
        err: Option<&ObservedError>,
    ) -> Result<Option<RetryDone>> {
        if self.config.mode == BufferMode::Disabled {
            return Ok(None);
        }
        let shard_buffer = self.shard_buffer(keyspace, shard);
        shard_buffer.wait_for_failover_end(ctx, err).await
    }

    /// Feeds a notification from the event source into the matching shard
    /// buffer, creating it if needed so that primary changes are tracked
    /// even for shards that never buffered anything.
    pub fn record_keyspace_event(&self, event: &KeyspaceEvent) {
        if self.config.mode == BufferMode::Disabled {
            return;
        }
        let shard_buffer = self.shard_buffer(&event.keyspace, &event.shard);
        shard_buffer.record_keyspace_event(event);
    }

    /// Force-drains every shard and waits for all spawned tasks to finish.
    pub async fn shutdown(&self) {
        let shards: Vec<Arc<ShardBuffer>> = self.read_shards().values().cloned().collect();
        for shard in &shards {
            shard.shutdown();
        }
        for shard in &shards {
            shard.wait_for_shutdown().await;
        }
    }

    /// Current lifecycle state of one shard buffer, if it exists.
    pub fn shard_state(&self, keyspace: &str, shard: &str) -> Option<BufferState> {
        self.lookup(keyspace, shard).map(|sb| sb.state())
    }

    /// Statistics snapshot of one shard buffer, if it exists.
    pub fn shard_stats(&self, keyspace: &str, shard: &str) -> Option<ShardStatsSnapshot> {
        self.lookup(keyspace, shard).map(|sb| sb.snapshot())
    }

    fn lookup(&self, keyspace: &str, shard: &str) -> Option<Arc<ShardBuffer>> {
        self.read_shards()
            .get(&(keyspace.to_string(), shard.to_string()))
            .cloned()
    }

    fn shard_buffer(&self, keyspace: &str, shard: &str) -> Arc<ShardBuffer> {
        if let Some(existing) = self.lookup(keyspace, shard) {
            return existing;
        }
        let mut shards = self
            .shards
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            shards
                .entry((keyspace.to_string(), shard.to_string()))
                .or_insert_with(|| {
                    ShardBuffer::new(
                        keyspace.to_string(),
                        shard.to_string(),
                        Arc::clone(&self.config),
                        Arc::clone(&self.admission),
                        self.topology.clone(),
                    )
                }),
        )
    }

    fn read_shards(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<(String, String), Arc<ShardBuffer>>> {
        self.shards.read().unwrap_or_else(PoisonError::into_inner)
    }
}
