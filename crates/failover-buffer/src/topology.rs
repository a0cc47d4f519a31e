//! Integration points with the external topology / health event source.
//!
//! The buffer never reaches into a global registry: the outbound "mark this
//! shard not serving" call lives on a single-method trait supplied at
//! construction, and the inbound notifications arrive as plain
//! [`KeyspaceEvent`] values.

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Outbound interface to the topology watcher.
///
/// Before a shard starts buffering it tells the watcher to treat the shard
/// as not serving, so that the watcher keeps emitting keyspace events for it
/// until the failover resolves. If the call returns `false` (for example the
/// keyspace was deleted, or the watcher has not seen the shard yet), the
/// buffer declines to buffer: a shard the watcher does not track might never
/// produce the event that stops buffering.
pub trait TopologyWatcher: Send + Sync {
    /// Best-effort notification that `keyspace/shard` should be treated as
    /// not serving. Returns `false` to veto buffering.
    fn mark_shard_not_serving<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        keyspace: &'a str,
        shard: &'a str,
        due_to_reparenting: bool,
    ) -> BoxFuture<'a, bool>;
}

/// State of a MoveTables-style traffic switch affecting a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveTablesState {
    /// No workflow is switching traffic.
    #[default]
    None,
    /// A workflow is in the process of switching traffic.
    Switching,
    /// Traffic has been switched away from this shard.
    Switched,
}

/// A notification from the event source about one shard.
#[derive(Debug, Clone)]
pub struct KeyspaceEvent {
    /// Keyspace the event applies to.
    pub keyspace: String,
    /// Shard the event applies to.
    pub shard: String,
    /// Opaque identifier of the shard's current primary, if any.
    pub primary: Option<String>,
    /// True if the shard is (still) serving after this event.
    pub still_serving: bool,
    /// MoveTables traffic-switch state carried with the event.
    pub move_tables: MoveTablesState,
}

impl KeyspaceEvent {
    /// Convenience constructor for the common "primary changed / failover
    /// resolved" notification.
    pub fn serving(keyspace: impl Into<String>, shard: impl Into<String>, primary: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            shard: shard.into(),
            primary: Some(primary.into()),
            still_serving: true,
            move_tables: MoveTablesState::None,
        }
    }
}
