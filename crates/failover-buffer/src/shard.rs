//! Per-shard request buffering during a failover.
//!
//! A [`ShardBuffer`] is reused across failovers; when none is in progress it
//! sits in [`BufferState::Idle`]. It is touched concurrently by request
//! threads, the event-source listener, the timeout watcher and the drain
//! worker, so every mutable field lives under one reader-writer lock that is
//! never held across a suspension point.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Instant as StdInstant;

use tokio::sync::oneshot;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use failover_buffer_core::events::{BufferEvent, EvictReason, SkipReason, StopReason};

use crate::config::{BufferConfig, BufferMode};
use crate::entry::{Entry, RetryDone, WaitOutcome};
use crate::error::{BufferError, Result};
use crate::stats::{ShardStats, ShardStatsSnapshot};
use crate::timeout::{spawn_timeout_watcher, TimeoutWatcherHandle};
use crate::topology::{KeyspaceEvent, MoveTablesState, TopologyWatcher};
use crate::ObservedError;

/// Lifecycle state of a shard buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// No failover is currently in progress.
    Idle,
    /// A failover is in progress and requests are being held.
    Buffering,
    /// The failover ended and the captured queue is being released.
    Draining,
}

/// Decision table for whether a request should be buffered.
fn should_buffer(state: BufferState, failover_detected: bool) -> bool {
    match (state, failover_detected) {
        // No failover in progress.
        (BufferState::Idle, false) => false,
        // Not buffering yet, but a new failover was detected.
        (BufferState::Idle, true) => true,
        // Failover in progress.
        (BufferState::Buffering, _) => true,
        // Draining: requests pass through. A request that still saw a
        // failover error lost the race with the end of the failover and
        // retries immediately instead of waiting for the next one.
        (BufferState::Draining, _) => false,
    }
}

struct Inner {
    state: BufferState,
    /// Buffered requests, oldest at the front.
    queue: VecDeque<Arc<Entry>>,
    /// Last time a BUFFERING phase started.
    last_start: Option<Instant>,
    /// Last time a BUFFERING phase ended.
    last_end: Option<Instant>,
    /// Last time the primary's identity was observed to change.
    last_reparent: Option<Instant>,
    /// Tracked to decide when to update `last_reparent`.
    current_primary: Option<String>,
    /// Present exactly while `state == Buffering` or a drain is still
    /// running; the drain clears it.
    watcher: Option<TimeoutWatcherHandle>,
}

/// Checks the anti-thrash heuristics. Must only be consulted while idle.
fn too_recent(inner: &Inner, min_time_between_failovers: Duration) -> Option<SkipReason> {
    let now = Instant::now();

    // Buffering stopped very recently. This happens when the new primary is
    // not writable yet right after a drain and requests keep failing.
    if let Some(last_end) = inner.last_end {
        if now.duration_since(last_end) < min_time_between_failovers {
            return Some(SkipReason::LastFailoverTooRecent);
        }
    }

    // A primary change was observed without any buffering. At low QPS the
    // end of a reparent can be seen before the first failing request;
    // buffering now would never be stopped by an event that was already
    // consumed.
    if let Some(last_reparent) = inner.last_reparent {
        if now.duration_since(last_reparent) < min_time_between_failovers {
            return Some(SkipReason::LastReparentTooRecent);
        }
    }

    None
}

struct BufferedRequest {
    entry: Arc<Entry>,
    done_rx: oneshot::Receiver<WaitOutcome>,
    queue_len: usize,
    evicted_head: bool,
}

struct StopEffects {
    reason: StopReason,
    duration: Duration,
    queued: usize,
}

/// Buffers requests of one `(keyspace, shard)` during failovers.
pub(crate) struct ShardBuffer {
    mode: BufferMode,
    keyspace: String,
    shard: String,
    config: Arc<BufferConfig>,
    /// Process-wide admission semaphore, shared with every other shard.
    admission: Arc<Semaphore>,
    topology: Option<Arc<dyn TopologyWatcher>>,
    stats: ShardStats,
    /// Tracks the timeout watcher and drain tasks for shutdown.
    tracker: TaskTracker,
    /// Self-handle for the watcher and drain tasks this buffer spawns.
    weak: Weak<ShardBuffer>,
    inner: RwLock<Inner>,
}

impl ShardBuffer {
    pub(crate) fn new(
        keyspace: String,
        shard: String,
        config: Arc<BufferConfig>,
        admission: Arc<Semaphore>,
        topology: Option<Arc<dyn TopologyWatcher>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            mode: config.mode,
            keyspace,
            shard,
            config,
            admission,
            topology,
            stats: ShardStats::new(),
            tracker: TaskTracker::new(),
            weak: weak.clone(),
            inner: RwLock::new(Inner {
                state: BufferState::Idle,
                queue: VecDeque::new(),
                last_start: None,
                last_end: None,
                last_reparent: None,
                current_primary: None,
                watcher: None,
            }),
        })
    }

    pub(crate) fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub(crate) fn state(&self) -> BufferState {
        self.read().state
    }

    pub(crate) fn snapshot(&self) -> ShardStatsSnapshot {
        let inner = self.read();
        self.stats.snapshot(inner.state, inner.queue.len())
    }

    /// Holds the request until the failover ends, its buffering window
    /// expires, it is evicted, or `ctx` fires.
    ///
    /// See [`crate::Buffer::wait_for_failover_end`] for the API contract of
    /// the return value.
    pub(crate) async fn wait_for_failover_end(
        &self,
        ctx: &CancellationToken,
        err: Option<&ObservedError>,
    ) -> Result<Option<RetryDone>> {
        // A non-nil error is assumed to be caused by a failover; anything
        // else must be filtered out at higher layers.
        let failover_detected = err.is_some();

        // Fast path (read lock): check if we should NOT buffer the request
        // and return early.
        {
            let inner = self.read();
            if !should_buffer(inner.state, failover_detected) {
                return Ok(None);
            }
        }

        // Buffering required. Take the write lock and re-check, the state
        // may have changed in the meantime.
        let mut inner = self.write();
        if !should_buffer(inner.state, failover_detected) {
            return Ok(None);
        }

        let mut started = false;
        let mut carried_permit: Option<OwnedSemaphorePermit> = None;
        if inner.state == BufferState::Idle {
            if let Some(reason) = too_recent(&inner, self.config.min_time_between_failovers) {
                drop(inner);
                self.emit_skipped(reason, err);
                return Ok(None);
            }

            // Take the admission slot before transitioning: if the whole
            // buffer is tied up by other shards there is no point entering
            // BUFFERING just to fail this very first request. Dry-run mode
            // never takes slots.
            if self.mode != BufferMode::DryRun {
                match Arc::clone(&self.admission).try_acquire_owned() {
                    Ok(permit) => carried_permit = Some(permit),
                    Err(_) => {
                        drop(inner);
                        self.emit_skipped(SkipReason::BufferFull, err);
                        return Err(BufferError::BufferFull {
                            capacity: self.config.size,
                        });
                    }
                }
            }

            // Tell the topology watcher the shard is not serving, without
            // holding the lock: the call may block on the network. If it
            // fails (keyspace deleted, shard unknown to the watcher) nothing
            // would ever stop the buffering, so decline to buffer.
            drop(inner);
            if !self.notify_not_serving(ctx, err).await {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    keyspace = %self.keyspace,
                    shard = %self.shard,
                    "failed to mark shard as not serving, not buffering"
                );
                return Ok(None);
            }

            inner = self.write();
            if !should_buffer(inner.state, failover_detected) {
                return Ok(None);
            }
            if inner.state == BufferState::Idle {
                // Re-check the heuristics: a whole failover cycle may have
                // completed while the lock was released.
                if let Some(reason) = too_recent(&inner, self.config.min_time_between_failovers) {
                    drop(inner);
                    self.emit_skipped(reason, err);
                    return Ok(None);
                }
                self.start_buffering_locked(&mut inner);
                started = true;
            }
            // Another request thread won the transition; join its queue.
        }

        if self.mode == BufferMode::DryRun {
            drop(inner);
            if started {
                self.emit_started(err);
            }
            self.emit_buffered_dry_run();
            return Ok(None);
        }

        match self.buffer_request_locked(&mut inner, carried_permit) {
            Ok(buffered) => {
                drop(inner);
                if started {
                    self.emit_started(err);
                }
                if buffered.evicted_head {
                    self.emit_evicted(EvictReason::BufferFull);
                }
                self.emit_buffered(buffered.queue_len);
                self.wait(ctx, buffered.entry, buffered.done_rx).await
            }
            Err(e) => {
                drop(inner);
                if started {
                    self.emit_started(err);
                }
                self.emit_skipped(SkipReason::BufferFull, err);
                Err(e)
            }
        }
    }

    /// IDLE → BUFFERING. The admission slot and the topology notification
    /// have already been secured by the caller.
    fn start_buffering_locked(&self, inner: &mut Inner) {
        let Some(this) = self.weak.upgrade() else {
            // The buffer is being dropped; nothing to watch.
            return;
        };
        self.stats.record_start();
        let now = Instant::now();
        inner.last_start = Some(now);
        self.warn_unexpected_state(inner.state, BufferState::Idle);
        inner.state = BufferState::Buffering;
        inner.queue.clear();
        inner.watcher = Some(spawn_timeout_watcher(
            this,
            now + self.config.max_failover_duration,
        ));
    }

    /// Appends a new entry, evicting this shard's oldest entry first if the
    /// buffer is full. `carried_permit` is the slot acquired up front by the
    /// IDLE transition, if any.
    fn buffer_request_locked(
        &self,
        inner: &mut Inner,
        carried_permit: Option<OwnedSemaphorePermit>,
    ) -> Result<BufferedRequest> {
        let mut evicted_head = false;
        let permit = if let Some(permit) = carried_permit {
            permit
        } else {
            match Arc::clone(&self.admission).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    let Some(head) = inner.queue.pop_front() else {
                        // The whole buffer is consumed by other shards.
                        return Err(BufferError::BufferFull {
                            capacity: self.config.size,
                        });
                    };
                    // Evict the head and reuse its slot for the new request.
                    // The evicted retry may still be running, so the number
                    // of evicted plus drained requests can exceed the buffer
                    // size; reusing the slot immediately bounds how long a
                    // full buffer can starve this shard.
                    let reused = head.take_permit();
                    head.unblock(Some(BufferError::Evicted));
                    evicted_head = true;
                    match reused {
                        Some(permit) => permit,
                        None => {
                            // Queued entries always own their slot; recover
                            // with a fresh acquisition if that ever breaks.
                            self.log_invariant_violation(
                                "evicted head entry held no admission permit",
                            );
                            match Arc::clone(&self.admission).try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    return Err(BufferError::BufferFull {
                                        capacity: self.config.size,
                                    })
                                }
                            }
                        }
                    }
                }
            }
        };

        let deadline = Instant::now() + self.config.window;
        let (entry, done_rx) = Entry::new(deadline, permit);
        let entry = Arc::new(entry);
        inner.queue.push_back(Arc::clone(&entry));
        let queue_len = inner.queue.len();

        if queue_len == 1 {
            if let Some(watcher) = &inner.watcher {
                watcher.notify_queue_not_empty();
            }
        }

        Ok(BufferedRequest {
            entry,
            done_rx,
            queue_len,
            evicted_head,
        })
    }

    /// Blocks until the entry is unblocked or `ctx` fires.
    async fn wait(
        &self,
        ctx: &CancellationToken,
        entry: Arc<Entry>,
        mut done_rx: oneshot::Receiver<WaitOutcome>,
    ) -> Result<Option<RetryDone>> {
        tokio::select! {
            _ = ctx.cancelled() => {
                if self.remove(&entry) {
                    self.emit_evicted(EvictReason::ContextDone);
                }
                Err(BufferError::ContextCanceled)
            }
            outcome = &mut done_rx => match outcome {
                Ok(WaitOutcome { retry, err: None }) => Ok(Some(retry)),
                Ok(WaitOutcome { retry, err: Some(err) }) => {
                    // A terminal error means the caller will not retry
                    // through this token; dropping it returns the slot.
                    drop(retry);
                    Err(err)
                }
                Err(_) => {
                    self.log_invariant_violation("buffered entry dropped without an outcome");
                    Ok(None)
                }
            },
        }
    }

    /// Removes an entry whose caller canceled while buffered. Returns false
    /// if a drain or eviction already unblocked it.
    fn remove(&self, entry: &Arc<Entry>) -> bool {
        let mut inner = self.write();
        if inner.state != BufferState::Buffering {
            // The queue was already captured by a drain, which will unblock
            // the entry.
            return false;
        }
        if let Some(position) = inner.queue.iter().position(|e| Arc::ptr_eq(e, entry)) {
            inner.queue.remove(position);
            // The caller is gone and will never fire its retry token, so
            // discard the entry: that returns the admission slot and fires
            // the completion signal on the caller's behalf.
            entry.abandon();
            return true;
        }
        false
    }

    /// Head of the queue, if any. Used by the timeout watcher.
    pub(crate) fn oldest_entry(&self) -> Option<Arc<Entry>> {
        self.read().queue.front().cloned()
    }

    /// Evicts `expected` if it is still at the head of the queue. Called by
    /// the timeout watcher when the head's buffering window expired.
    pub(crate) fn evict_oldest_entry(&self, expected: &Arc<Entry>) {
        {
            let mut inner = self.write();
            let is_head = inner
                .queue
                .front()
                .is_some_and(|head| Arc::ptr_eq(head, expected));
            if !is_head {
                // Already removed, e.g. by remove(). Ignore it.
                return;
            }
            inner.queue.pop_front();
            // A nil outcome: the caller retries on its own. Its slot is
            // returned when that retry finishes, not now, so the buffer may
            // stay full while evicted retries are still running.
            expected.unblock(None);
        }
        self.emit_evicted(EvictReason::WindowExceeded);
    }

    /// Feeds one notification from the event source into the state machine.
    pub(crate) fn record_keyspace_event(&self, event: &KeyspaceEvent) {
        let stop = {
            let mut inner = self.write();

            if event.primary != inner.current_primary {
                if inner.current_primary.is_some() {
                    inner.last_reparent = Some(Instant::now());
                }
                inner.current_primary = event.primary.clone();
            }

            // Heuristically determine why the disruption resolved.
            let reason = if event.move_tables == MoveTablesState::Switched {
                StopReason::MoveTablesSwitchingTraffic
            } else if event.still_serving {
                StopReason::FailoverEndDetected
            } else {
                StopReason::ShardMissing
            };
            self.stop_buffering_locked(&mut inner, reason)
        };
        if let Some(stop) = stop {
            self.emit_stopped(stop);
        }
    }

    /// Called by the timeout watcher when `max_failover_duration` elapsed
    /// without an end-of-failover event.
    pub(crate) fn stop_buffering_due_to_max_duration(&self) {
        let stop = {
            let mut inner = self.write();
            self.stop_buffering_locked(&mut inner, StopReason::MaxFailoverDurationExceeded)
        };
        if let Some(stop) = stop {
            self.emit_stopped(stop);
        }
    }

    /// BUFFERING → DRAINING. Captures the queue and spawns the drain. A
    /// no-op in any other state, which is what makes keyspace events
    /// idempotent outside of a failover.
    fn stop_buffering_locked(&self, inner: &mut Inner, reason: StopReason) -> Option<StopEffects> {
        if inner.state != BufferState::Buffering {
            return None;
        }
        let Some(this) = self.weak.upgrade() else {
            return None;
        };

        let now = Instant::now();
        inner.last_end = Some(now);
        let duration = inner
            .last_start
            .map(|start| now.duration_since(start))
            .unwrap_or_default();
        self.stats
            .record_stop(duration, self.mode == BufferMode::DryRun, self.config.size);

        inner.state = BufferState::Draining;
        // Detach the queue so remove() and the watcher stop working on
        // obsolete data; the drain owns the captured entries exclusively.
        let queue: Vec<Arc<Entry>> = inner.queue.drain(..).collect();
        let queued = queue.len();

        let entry_err = (reason == StopReason::ShardMissing).then(|| BufferError::ShardMissing {
            keyspace: self.keyspace.clone(),
            shard: self.shard.clone(),
        });

        // The watcher handle stays in place until the drain clears it; the
        // drain stops the watcher outside the lock.
        let watcher = inner.watcher.clone();
        self.tracker
            .spawn(async move { this.drain(queue, entry_err, watcher).await });

        Some(StopEffects {
            reason,
            duration,
            queued,
        })
    }

    /// Releases the captured queue with bounded parallelism, then goes back
    /// to IDLE.
    async fn drain(
        self: Arc<Self>,
        queue: Vec<Arc<Entry>>,
        err: Option<BufferError>,
        watcher: Option<TimeoutWatcherHandle>,
    ) {
        // Stop the watcher outside the lock: it may be in the middle of a
        // call back into this buffer.
        if let Some(watcher) = &watcher {
            watcher.stop();
        }

        let start = Instant::now();
        let count = queue.len();
        let parallelism = self.config.drain_concurrency.min(count);

        let queue = Arc::new(queue);
        let next_index = Arc::new(AtomicUsize::new(0));
        let mut workers = Vec::with_capacity(parallelism);
        for _ in 0..parallelism {
            let queue = Arc::clone(&queue);
            let next_index = Arc::clone(&next_index);
            let err = err.clone();
            workers.push(tokio::spawn(async move {
                // The counter hands every index to exactly one worker and
                // the captured queue is immutable, so workers never race on
                // an entry.
                loop {
                    let index = next_index.fetch_add(1, Ordering::Relaxed);
                    if index >= queue.len() {
                        break;
                    }
                    let finished = queue[index].unblock(err.clone());
                    if let Some(finished) = finished {
                        // Wait until the released request completed its
                        // retry before releasing the next one, so the drain
                        // does not flood the freshly promoted primary.
                        let _ = finished.await;
                    }
                }
            }));
        }
        for worker in workers {
            let _ = worker.await;
        }

        let duration = start.elapsed();
        self.stats.record_drained(count);
        {
            let mut inner = self.write();
            self.warn_unexpected_state(inner.state, BufferState::Draining);
            inner.state = BufferState::Idle;
            inner.watcher = None;
        }
        self.emit_drained(count, duration);
    }

    /// Forces a drain with the shutdown reason. No-op unless buffering.
    pub(crate) fn shutdown(&self) {
        let stop = {
            let mut inner = self.write();
            self.stop_buffering_locked(&mut inner, StopReason::Shutdown)
        };
        if let Some(stop) = stop {
            self.emit_stopped(stop);
        }
    }

    /// Blocks until every task this shard ever spawned has terminated.
    pub(crate) async fn wait_for_shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    async fn notify_not_serving(&self, ctx: &CancellationToken, err: Option<&ObservedError>) -> bool {
        let Some(topology) = &self.topology else {
            return true;
        };
        let due_to_reparenting = self.config.due_to_reparenting(err);
        topology
            .mark_shard_not_serving(ctx, &self.keyspace, &self.shard, due_to_reparenting)
            .await
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// A wrong state is less severe than taking the whole router down, so
    /// state mismatches are logged, never panicked on.
    fn warn_unexpected_state(&self, actual: BufferState, expected: BufferState) {
        if actual != expected {
            #[cfg(feature = "tracing")]
            tracing::error!(
                keyspace = %self.keyspace,
                shard = %self.shard,
                ?actual,
                ?expected,
                "BUG: buffer state mismatch"
            );
        }
    }

    fn log_invariant_violation(&self, _message: &str) {
        #[cfg(feature = "tracing")]
        tracing::error!(
            keyspace = %self.keyspace,
            shard = %self.shard,
            "BUG: {_message}"
        );
    }

    fn emit_started(&self, _err: Option<&ObservedError>) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            keyspace = %self.keyspace,
            shard = %self.shard,
            window = ?self.config.window,
            size = self.config.size,
            max_failover_duration = ?self.config.max_failover_duration,
            dry_run = self.mode == BufferMode::DryRun,
            error = _err.map(|e| e.to_string()).as_deref().unwrap_or("n/a"),
            "starting buffering"
        );
        #[cfg(feature = "metrics")]
        metrics::counter!(
            "failover_buffer_starts_total",
            "keyspace" => self.keyspace.clone(),
            "shard" => self.shard.clone()
        )
        .increment(1);
        self.config
            .sinks
            .record(&BufferEvent::BufferingStarted {
                keyspace: self.keyspace.clone(),
                shard: self.shard.clone(),
                timestamp: StdInstant::now(),
                dry_run: self.mode == BufferMode::DryRun,
            });
    }

    fn emit_stopped(&self, stop: StopEffects) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            keyspace = %self.keyspace,
            shard = %self.shard,
            reason = stop.reason.as_str(),
            duration = ?stop.duration,
            queued = stop.queued,
            dry_run = self.mode == BufferMode::DryRun,
            "stopping buffering, draining queued requests"
        );
        #[cfg(feature = "metrics")]
        {
            metrics::counter!(
                "failover_buffer_stops_total",
                "keyspace" => self.keyspace.clone(),
                "shard" => self.shard.clone(),
                "reason" => stop.reason.as_str()
            )
            .increment(1);
            metrics::gauge!(
                "failover_buffer_last_failover_duration_ms",
                "keyspace" => self.keyspace.clone(),
                "shard" => self.shard.clone()
            )
            .set(stop.duration.as_millis() as f64);
        }
        self.config
            .sinks
            .record(&BufferEvent::BufferingStopped {
                keyspace: self.keyspace.clone(),
                shard: self.shard.clone(),
                timestamp: StdInstant::now(),
                reason: stop.reason,
                duration: stop.duration,
                queued: stop.queued,
            });
    }

    fn emit_buffered(&self, queue_len: usize) {
        self.stats.record_buffered(queue_len);
        #[cfg(feature = "metrics")]
        {
            metrics::counter!(
                "failover_buffer_requests_buffered_total",
                "keyspace" => self.keyspace.clone(),
                "shard" => self.shard.clone()
            )
            .increment(1);
            metrics::gauge!(
                "failover_buffer_queue_len",
                "keyspace" => self.keyspace.clone(),
                "shard" => self.shard.clone()
            )
            .set(queue_len as f64);
        }
        self.config
            .sinks
            .record(&BufferEvent::RequestBuffered {
                keyspace: self.keyspace.clone(),
                shard: self.shard.clone(),
                timestamp: StdInstant::now(),
                queue_len,
                dry_run: false,
            });
    }

    fn emit_buffered_dry_run(&self) {
        self.stats.record_buffered_dry_run();
        #[cfg(feature = "metrics")]
        metrics::counter!(
            "failover_buffer_requests_buffered_dry_run_total",
            "keyspace" => self.keyspace.clone(),
            "shard" => self.shard.clone()
        )
        .increment(1);
        self.config
            .sinks
            .record(&BufferEvent::RequestBuffered {
                keyspace: self.keyspace.clone(),
                shard: self.shard.clone(),
                timestamp: StdInstant::now(),
                queue_len: 0,
                dry_run: true,
            });
    }

    fn emit_evicted(&self, reason: EvictReason) {
        self.stats.record_evicted();
        #[cfg(feature = "metrics")]
        metrics::counter!(
            "failover_buffer_requests_evicted_total",
            "keyspace" => self.keyspace.clone(),
            "shard" => self.shard.clone(),
            "reason" => reason.as_str()
        )
        .increment(1);
        self.config
            .sinks
            .record(&BufferEvent::RequestEvicted {
                keyspace: self.keyspace.clone(),
                shard: self.shard.clone(),
                timestamp: StdInstant::now(),
                reason,
            });
    }

    fn emit_skipped(&self, reason: SkipReason, _err: Option<&ObservedError>) {
        self.stats.record_skipped();
        #[cfg(feature = "tracing")]
        tracing::debug!(
            keyspace = %self.keyspace,
            shard = %self.shard,
            reason = reason.as_str(),
            error = _err.map(|e| e.to_string()).as_deref().unwrap_or("n/a"),
            "not buffering request"
        );
        #[cfg(feature = "metrics")]
        metrics::counter!(
            "failover_buffer_requests_skipped_total",
            "keyspace" => self.keyspace.clone(),
            "shard" => self.shard.clone(),
            "reason" => reason.as_str()
        )
        .increment(1);
        self.config
            .sinks
            .record(&BufferEvent::RequestSkipped {
                keyspace: self.keyspace.clone(),
                shard: self.shard.clone(),
                timestamp: StdInstant::now(),
                reason,
            });
    }

    fn emit_drained(&self, count: usize, duration: Duration) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            keyspace = %self.keyspace,
            shard = %self.shard,
            count,
            duration = ?duration,
            "draining finished"
        );
        #[cfg(feature = "metrics")]
        metrics::counter!(
            "failover_buffer_requests_drained_total",
            "keyspace" => self.keyspace.clone(),
            "shard" => self.shard.clone()
        )
        .increment(count as u64);
        self.config
            .sinks
            .record(&BufferEvent::RequestsDrained {
                keyspace: self.keyspace.clone(),
                shard: self.shard.clone(),
                timestamp: StdInstant::now(),
                count,
                duration,
            });
    }
}
