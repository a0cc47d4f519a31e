//! Timeout watcher: one task per BUFFERING phase.
//!
//! The watcher and the shard buffer reference each other (the watcher evicts
//! aged entries and triggers the max-duration stop, the buffer wakes the
//! watcher when its queue goes non-empty). The cycle is broken by sharing
//! only a small handle of communication primitives: a wake signal and a stop
//! token. The buffer creates the watcher at BUFFERING start and stops it at
//! drain start, so the lifetime is bounded by a single phase.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::shard::ShardBuffer;

/// Handle kept by the shard buffer while its watcher runs.
#[derive(Clone)]
pub(crate) struct TimeoutWatcherHandle {
    wake: Arc<Notify>,
    stop: CancellationToken,
}

impl TimeoutWatcherHandle {
    /// Wakes the watcher after the queue transitioned from empty to
    /// non-empty.
    pub(crate) fn notify_queue_not_empty(&self) {
        self.wake.notify_one();
    }

    /// Terminates the watcher. Idempotent.
    pub(crate) fn stop(&self) {
        self.stop.cancel();
    }
}

/// Spawns the watcher for a BUFFERING phase ending no later than
/// `hard_deadline`.
pub(crate) fn spawn_timeout_watcher(
    buffer: Arc<ShardBuffer>,
    hard_deadline: Instant,
) -> TimeoutWatcherHandle {
    let handle = TimeoutWatcherHandle {
        wake: Arc::new(Notify::new()),
        stop: CancellationToken::new(),
    };
    let task_handle = handle.clone();
    let tracker = buffer.tracker().clone();
    tracker.spawn(async move { run(buffer, task_handle, hard_deadline).await });
    handle
}

async fn run(buffer: Arc<ShardBuffer>, handle: TimeoutWatcherHandle, hard_deadline: Instant) {
    loop {
        if handle.stop.is_cancelled() {
            return;
        }

        match buffer.oldest_entry() {
            Some(head) => {
                let next_deadline = head.deadline().min(hard_deadline);
                tokio::select! {
                    _ = sleep_until(next_deadline) => {
                        if Instant::now() >= hard_deadline {
                            buffer.stop_buffering_due_to_max_duration();
                            return;
                        }
                        // Only evicts if this entry is still at the head;
                        // remove() or a drain may have beaten us to it.
                        buffer.evict_oldest_entry(&head);
                    }
                    _ = handle.stop.cancelled() => return,
                }
            }
            None => {
                // Queue is empty: block until something is buffered instead
                // of busy-looping, but keep the hard deadline armed. A
                // dry-run phase never queues anything, so this is also the
                // path that ends a dry-run failover.
                tokio::select! {
                    _ = sleep_until(hard_deadline) => {
                        buffer.stop_buffering_due_to_max_duration();
                        return;
                    }
                    _ = handle.wake.notified() => {}
                    _ = handle.stop.cancelled() => return,
                }
            }
        }
    }
}
