mod cancel;
mod dry_run;
mod shutdown;

/// Shared fixtures: a capture sink for events, a mock topology watcher and
/// callers driven on a paused clock.
pub(crate) mod helpers {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use failover_buffer::{
        Buffer, BufferConfig, BufferConfigBuilder, BufferError, BufferState, EvictReason,
        SkipReason, StopReason, TopologyWatcher,
    };
    use futures::future::BoxFuture;
    use tokio_util::sync::CancellationToken;

    pub(crate) const SIZE: usize = 10;

    /// Config used by most scenarios: size 10, window 10s, max failover
    /// duration 20s, min time between failovers 1s, drain concurrency 2.
    pub(crate) fn test_config() -> BufferConfigBuilder {
        BufferConfig::builder()
            .size(SIZE)
            .window(Duration::from_secs(10))
            .max_failover_duration(Duration::from_secs(20))
            .min_time_between_failovers(Duration::from_secs(1))
            .drain_concurrency(2)
    }

    pub(crate) fn failover_err() -> std::io::Error {
        std::io::Error::other("operation not allowed in state NOT_SERVING")
    }

    /// Captures event emissions for assertions.
    #[derive(Default)]
    pub(crate) struct Capture {
        pub started: AtomicUsize,
        pub stopped: Mutex<Vec<StopReason>>,
        pub buffered: AtomicUsize,
        pub evicted: Mutex<Vec<EvictReason>>,
        pub skipped: Mutex<Vec<SkipReason>>,
        pub drained: AtomicUsize,
    }

    impl Capture {
        pub(crate) fn stopped(&self) -> Vec<StopReason> {
            self.stopped.lock().unwrap().clone()
        }

        pub(crate) fn evicted(&self) -> Vec<EvictReason> {
            self.evicted.lock().unwrap().clone()
        }

        pub(crate) fn skipped(&self) -> Vec<SkipReason> {
            self.skipped.lock().unwrap().clone()
        }
    }

    /// Wires a [`Capture`] into every event hook of `test_config`.
    pub(crate) fn capturing_config(builder: BufferConfigBuilder) -> (BufferConfig, Arc<Capture>) {
        let capture = Arc::new(Capture::default());
        let started = Arc::clone(&capture);
        let stopped = Arc::clone(&capture);
        let buffered = Arc::clone(&capture);
        let evicted = Arc::clone(&capture);
        let skipped = Arc::clone(&capture);
        let drained = Arc::clone(&capture);
        let config = builder
            .on_buffering_started(move |_, _| {
                started.started.fetch_add(1, Ordering::SeqCst);
            })
            .on_buffering_stopped(move |reason, _| {
                stopped.stopped.lock().unwrap().push(reason);
            })
            .on_request_buffered(move |_| {
                buffered.buffered.fetch_add(1, Ordering::SeqCst);
            })
            .on_request_evicted(move |reason| {
                evicted.evicted.lock().unwrap().push(reason);
            })
            .on_request_skipped(move |reason| {
                skipped.skipped.lock().unwrap().push(reason);
            })
            .on_requests_drained(move |count, _| {
                drained.drained.fetch_add(count, Ordering::SeqCst);
            })
            .build();
        (config, capture)
    }

    /// Topology watcher that records calls and answers with a configurable
    /// verdict.
    pub(crate) struct MockTopology {
        pub accept: AtomicBool,
        pub calls: Mutex<Vec<(String, String, bool)>>,
    }

    impl MockTopology {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                accept: AtomicBool::new(true),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn rejecting() -> Arc<Self> {
            let topology = Self::new();
            topology.accept.store(false, Ordering::SeqCst);
            topology
        }
    }

    impl TopologyWatcher for MockTopology {
        fn mark_shard_not_serving<'a>(
            &'a self,
            _ctx: &'a CancellationToken,
            keyspace: &'a str,
            shard: &'a str,
            due_to_reparenting: bool,
        ) -> BoxFuture<'a, bool> {
            Box::pin(async move {
                self.calls.lock().unwrap().push((
                    keyspace.to_string(),
                    shard.to_string(),
                    due_to_reparenting,
                ));
                self.accept.load(Ordering::SeqCst)
            })
        }
    }

    /// Spawns a request thread observing a failover error. Resolves to
    /// `Ok(true)` if the request was buffered and released with a retry
    /// token (fired immediately), `Ok(false)` if it passed through
    /// unbuffered, and `Err` for terminal buffer errors.
    pub(crate) fn spawn_caller(
        buffer: &Arc<Buffer>,
        keyspace: &str,
        shard: &str,
    ) -> tokio::task::JoinHandle<Result<bool, BufferError>> {
        let buffer = Arc::clone(buffer);
        let keyspace = keyspace.to_string();
        let shard = shard.to_string();
        tokio::spawn(async move {
            let ctx = CancellationToken::new();
            let err = failover_err();
            match buffer
                .wait_for_failover_end(&ctx, &keyspace, &shard, Some(&err))
                .await
            {
                Ok(Some(retry_done)) => {
                    retry_done.done();
                    Ok(true)
                }
                Ok(None) => Ok(false),
                Err(e) => Err(e),
            }
        })
    }

    /// Like [`spawn_caller`], but holds the retry token until `release`
    /// resolves, so tests can observe drain pacing.
    pub(crate) fn spawn_caller_holding(
        buffer: &Arc<Buffer>,
        keyspace: &str,
        shard: &str,
        unblocked: Arc<AtomicUsize>,
        release: tokio::sync::oneshot::Receiver<()>,
    ) -> tokio::task::JoinHandle<Result<bool, BufferError>> {
        let buffer = Arc::clone(buffer);
        let keyspace = keyspace.to_string();
        let shard = shard.to_string();
        tokio::spawn(async move {
            let ctx = CancellationToken::new();
            let err = failover_err();
            match buffer
                .wait_for_failover_end(&ctx, &keyspace, &shard, Some(&err))
                .await
            {
                Ok(Some(retry_done)) => {
                    unblocked.fetch_add(1, Ordering::SeqCst);
                    let _ = release.await;
                    retry_done.done();
                    Ok(true)
                }
                Ok(None) => Ok(false),
                Err(e) => Err(e),
            }
        })
    }

    const SPIN_LIMIT: usize = 100_000;

    /// Drives the (paused) runtime until the shard's queue has `len`
    /// entries.
    pub(crate) async fn wait_for_queue_len(buffer: &Buffer, keyspace: &str, shard: &str, len: usize) {
        for _ in 0..SPIN_LIMIT {
            if buffer
                .shard_stats(keyspace, shard)
                .map(|stats| stats.queue_len)
                == Some(len)
            {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("queue length of {keyspace}/{shard} never reached {len}");
    }

    /// Drives the (paused) runtime until the shard reaches `state`.
    pub(crate) async fn wait_for_state(
        buffer: &Buffer,
        keyspace: &str,
        shard: &str,
        state: BufferState,
    ) {
        for _ in 0..SPIN_LIMIT {
            if buffer.shard_state(keyspace, shard) == Some(state) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("{keyspace}/{shard} never reached {state:?}");
    }
}
