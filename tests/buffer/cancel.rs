//! Caller cancellation while buffered.

use std::sync::Arc;
use std::time::Duration;

use failover_buffer::{Buffer, BufferError, BufferState, EvictReason, KeyspaceEvent};
use tokio_util::sync::CancellationToken;

use super::helpers::*;

#[tokio::test(start_paused = true)]
async fn canceled_caller_is_removed_and_frees_its_slot() {
    // A single slot makes a leak immediately visible.
    let (config, capture) = capturing_config(test_config().size(1));
    let buffer = Arc::new(Buffer::new(config));

    let ctx = CancellationToken::new();
    let caller_ctx = ctx.clone();
    let buffer_clone = Arc::clone(&buffer);
    let caller = tokio::spawn(async move {
        let err = failover_err();
        buffer_clone
            .wait_for_failover_end(&caller_ctx, "ks", "0", Some(&err))
            .await
            .map(|token| token.is_some())
    });
    wait_for_queue_len(&buffer, "ks", "0", 1).await;

    ctx.cancel();
    assert_eq!(caller.await.unwrap(), Err(BufferError::ContextCanceled));
    wait_for_queue_len(&buffer, "ks", "0", 0).await;
    assert_eq!(capture.evicted(), vec![EvictReason::ContextDone]);
    assert_eq!(buffer.shard_state("ks", "0"), Some(BufferState::Buffering));

    // The canceled request's slot is free again: the next request fits into
    // the single-slot buffer.
    let replacement = spawn_caller(&buffer, "ks", "0");
    wait_for_queue_len(&buffer, "ks", "0", 1).await;
    buffer.record_keyspace_event(&KeyspaceEvent::serving("ks", "0", "B"));
    assert_eq!(replacement.await.unwrap(), Ok(true));
}

#[tokio::test(start_paused = true)]
async fn cancellation_before_the_window_does_not_count_as_window_eviction() {
    let (config, capture) = capturing_config(test_config());
    let buffer = Arc::new(Buffer::new(config));

    let ctx = CancellationToken::new();
    let caller_ctx = ctx.clone();
    let buffer_clone = Arc::clone(&buffer);
    let caller = tokio::spawn(async move {
        let err = failover_err();
        buffer_clone
            .wait_for_failover_end(&caller_ctx, "ks", "0", Some(&err))
            .await
            .map(|token| token.is_some())
    });
    wait_for_queue_len(&buffer, "ks", "0", 1).await;

    tokio::time::advance(Duration::from_secs(1)).await;
    ctx.cancel();
    assert_eq!(caller.await.unwrap(), Err(BufferError::ContextCanceled));

    assert_eq!(capture.evicted(), vec![EvictReason::ContextDone]);
    assert_eq!(buffer.shard_stats("ks", "0").unwrap().requests_evicted, 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_after_the_drain_started_is_a_no_op() {
    let (config, capture) = capturing_config(test_config());
    let buffer = Arc::new(Buffer::new(config));

    let ctx = CancellationToken::new();
    let caller_ctx = ctx.clone();
    let buffer_clone = Arc::clone(&buffer);
    let caller = tokio::spawn(async move {
        let err = failover_err();
        match buffer_clone
            .wait_for_failover_end(&caller_ctx, "ks", "0", Some(&err))
            .await
        {
            Ok(Some(token)) => {
                token.done();
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        }
    });
    wait_for_queue_len(&buffer, "ks", "0", 1).await;

    // The drain wins the race: the entry is unblocked before the caller
    // notices the cancellation.
    buffer.record_keyspace_event(&KeyspaceEvent::serving("ks", "0", "B"));
    assert_eq!(caller.await.unwrap(), Ok(true));
    ctx.cancel();

    wait_for_state(&buffer, "ks", "0", BufferState::Idle).await;
    assert!(capture.evicted().is_empty());
}
