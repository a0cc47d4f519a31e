//! Dry-run mode: full decision logic, no blocking, no admission slots.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use failover_buffer::{Buffer, BufferMode, BufferState, KeyspaceEvent, StopReason};
use tokio_util::sync::CancellationToken;

use super::helpers::*;

#[tokio::test(start_paused = true)]
async fn dry_run_observes_without_holding_requests() {
    let (config, capture) = capturing_config(test_config().mode(BufferMode::DryRun));
    let topology = MockTopology::new();
    let buffer = Arc::new(Buffer::with_topology(config, topology.clone()));

    let ctx = CancellationToken::new();
    let err = failover_err();

    // Returns immediately even though the state machine started a phase.
    for _ in 0..3 {
        let outcome = buffer
            .wait_for_failover_end(&ctx, "ks", "0", Some(&err))
            .await;
        assert!(matches!(outcome, Ok(None)));
    }
    assert_eq!(buffer.shard_state("ks", "0"), Some(BufferState::Buffering));
    assert_eq!(capture.started.load(Ordering::SeqCst), 1);
    assert_eq!(topology.calls.lock().unwrap().len(), 1);

    let stats = buffer.shard_stats("ks", "0").unwrap();
    assert_eq!(stats.requests_buffered, 0);
    assert_eq!(stats.requests_buffered_dry_run, 3);
    assert_eq!(stats.queue_len, 0);

    // The phase ends through the usual event path.
    buffer.record_keyspace_event(&KeyspaceEvent::serving("ks", "0", "B"));
    wait_for_state(&buffer, "ks", "0", BufferState::Idle).await;
    assert_eq!(capture.stopped(), vec![StopReason::FailoverEndDetected]);

    let stats = buffer.shard_stats("ks", "0").unwrap();
    // 3 dry-run requests against 10 slots: 30% peak utilization.
    assert_eq!(stats.utilization_dry_run_sum, 30);
    assert_eq!(stats.utilization_sum, 0);
}

#[tokio::test(start_paused = true)]
async fn disabled_mode_skips_the_state_machine_entirely() {
    let (config, capture) = capturing_config(test_config().mode(BufferMode::Disabled));
    let buffer = Arc::new(Buffer::new(config));

    let ctx = CancellationToken::new();
    let err = failover_err();
    let outcome = buffer
        .wait_for_failover_end(&ctx, "ks", "0", Some(&err))
        .await;
    assert!(matches!(outcome, Ok(None)));

    // Not even a shard buffer was created.
    assert!(buffer.shard_state("ks", "0").is_none());
    assert_eq!(capture.started.load(Ordering::SeqCst), 0);
}
