//! Tower [`Layer`] wiring for the failover buffer.

use std::sync::Arc;

use tower::Layer;

use crate::buffer::Buffer;
use crate::service::FailoverBufferService;

pub(crate) type ShardResolver<Req> = Arc<dyn Fn(&Req) -> (String, String) + Send + Sync>;
pub(crate) type FailoverClassifier<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// A Tower [`Layer`] that buffers failover-related failures and retries them
/// once the failover ends.
///
/// The layer needs two pieces of routing knowledge:
/// - a *shard resolver* mapping a request to its `(keyspace, shard)` pair,
/// - a *failover classifier* deciding which inner-service errors look like a
///   failover (everything else is passed through untouched).
///
/// The wrapped service's error type never changes: when the buffer cannot
/// help, the caller sees exactly the error it would have seen without the
/// layer.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use failover_buffer::{Buffer, BufferConfig, FailoverBufferLayer};
/// use tower::ServiceBuilder;
///
/// #[derive(Clone)]
/// struct Query {
///     keyspace: String,
///     shard: String,
///     sql: String,
/// }
///
/// # async fn example() {
/// let buffer = Arc::new(Buffer::new(BufferConfig::builder().build()));
///
/// let layer = FailoverBufferLayer::new(
///     buffer,
///     |query: &Query| (query.keyspace.clone(), query.shard.clone()),
///     |err: &std::io::Error| err.to_string().contains("not serving"),
/// );
///
/// let service = ServiceBuilder::new()
///     .layer(layer)
///     .service_fn(|query: Query| async move {
///         Ok::<_, std::io::Error>(query.sql)
///     });
/// # }
/// ```
pub struct FailoverBufferLayer<Req, E> {
    buffer: Arc<Buffer>,
    shard_resolver: ShardResolver<Req>,
    failover_classifier: FailoverClassifier<E>,
}

impl<Req, E> FailoverBufferLayer<Req, E> {
    /// Creates a new layer over `buffer`.
    pub fn new<R, C>(buffer: Arc<Buffer>, shard_resolver: R, failover_classifier: C) -> Self
    where
        R: Fn(&Req) -> (String, String) + Send + Sync + 'static,
        C: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            buffer,
            shard_resolver: Arc::new(shard_resolver),
            failover_classifier: Arc::new(failover_classifier),
        }
    }
}

impl<Req, E> Clone for FailoverBufferLayer<Req, E> {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
            shard_resolver: Arc::clone(&self.shard_resolver),
            failover_classifier: Arc::clone(&self.failover_classifier),
        }
    }
}

impl<S, Req, E> Layer<S> for FailoverBufferLayer<Req, E> {
    type Service = FailoverBufferService<S, Req, E>;

    fn layer(&self, inner: S) -> Self::Service {
        FailoverBufferService::new(
            inner,
            Arc::clone(&self.buffer),
            Arc::clone(&self.shard_resolver),
            Arc::clone(&self.failover_classifier),
        )
    }
}
