//! Forced drain on shutdown and task joining.

use std::sync::Arc;

use failover_buffer::{Buffer, BufferState, StopReason};

use super::helpers::*;

#[tokio::test(start_paused = true)]
async fn shutdown_drains_buffered_requests_and_joins_all_tasks() {
    let (config, capture) = capturing_config(test_config());
    let buffer = Arc::new(Buffer::new(config));

    let callers: Vec<_> = (0..2).map(|_| spawn_caller(&buffer, "ks", "0")).collect();
    wait_for_queue_len(&buffer, "ks", "0", 2).await;

    buffer.shutdown().await;

    // Once shutdown returns, the drain and the watcher have terminated and
    // the shard is idle again.
    assert_eq!(buffer.shard_state("ks", "0"), Some(BufferState::Idle));
    assert_eq!(capture.stopped(), vec![StopReason::Shutdown]);

    // The shutdown reason injects no per-entry error: callers retry.
    for caller in callers {
        assert_eq!(caller.await.unwrap(), Ok(true));
    }
    assert_eq!(buffer.shard_stats("ks", "0").unwrap().requests_drained, 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_of_an_idle_buffer_returns_immediately() {
    let (config, capture) = capturing_config(test_config());
    let buffer = Arc::new(Buffer::new(config));

    // Create a shard buffer without ever buffering.
    let ctx = tokio_util::sync::CancellationToken::new();
    let outcome = buffer.wait_for_failover_end(&ctx, "ks", "0", None).await;
    assert!(matches!(outcome, Ok(None)));

    buffer.shutdown().await;
    assert_eq!(buffer.shard_state("ks", "0"), Some(BufferState::Idle));
    assert!(capture.stopped().is_empty());
}
