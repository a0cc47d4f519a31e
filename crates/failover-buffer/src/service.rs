//! Tower service that waits out failovers and retries once.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tower::Service;

use crate::buffer::Buffer;
use crate::layer::{FailoverClassifier, ShardResolver};
use crate::ObservedError;

/// Service produced by [`crate::FailoverBufferLayer`].
///
/// On an inner-service error that the classifier attributes to a failover,
/// the service consults the buffer. If the buffer holds the request until
/// the failover resolves, the (cloned) request is retried exactly once and
/// the retry token is fired when that retry completes. In every other case
/// the original error is returned unchanged: the layer never introduces a
/// failure mode the inner service did not already have.
pub struct FailoverBufferService<S, Req, E> {
    inner: S,
    buffer: Arc<Buffer>,
    shard_resolver: ShardResolver<Req>,
    failover_classifier: FailoverClassifier<E>,
}

impl<S, Req, E> FailoverBufferService<S, Req, E> {
    pub(crate) fn new(
        inner: S,
        buffer: Arc<Buffer>,
        shard_resolver: ShardResolver<Req>,
        failover_classifier: FailoverClassifier<E>,
    ) -> Self {
        Self {
            inner,
            buffer,
            shard_resolver,
            failover_classifier,
        }
    }
}

impl<S, Req, E> Clone for FailoverBufferService<S, Req, E>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            buffer: Arc::clone(&self.buffer),
            shard_resolver: Arc::clone(&self.shard_resolver),
            failover_classifier: Arc::clone(&self.failover_classifier),
        }
    }
}

impl<S, Req, E> Service<Req> for FailoverBufferService<S, Req, E>
where
    S: Service<Req, Error = E> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    Req: Clone + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Response = S::Response;
    type Error = E;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Req) -> Self::Future {
        let mut inner = self.inner.clone();
        let buffer = Arc::clone(&self.buffer);
        let shard_resolver = Arc::clone(&self.shard_resolver);
        let failover_classifier = Arc::clone(&self.failover_classifier);

        Box::pin(async move {
            let retry_request = request.clone();
            let error = match inner.call(request).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };
            if !(failover_classifier)(&error) {
                return Err(error);
            }

            let (keyspace, shard) = (shard_resolver)(&retry_request);
            // Cancellation is carried by this future itself: if the caller
            // drops it, the buffered entry is cleaned up by eviction.
            let ctx = CancellationToken::new();
            let observed: &ObservedError = &error;
            match buffer
                .wait_for_failover_end(&ctx, &keyspace, &shard, Some(observed))
                .await
            {
                Ok(Some(retry_done)) => {
                    let retried = inner.call(retry_request).await;
                    retry_done.done();
                    retried
                }
                // Not buffered, buffer full or evicted: surface the original
                // error rather than inventing a new one.
                Ok(None) | Err(_) => Err(error),
            }
        })
    }
}
