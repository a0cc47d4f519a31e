//! Configuration for the failover buffer.

use std::sync::Arc;
use std::time::Duration;

use failover_buffer_core::events::{BufferEvent, EvictReason, SkipReason, StopReason};
use failover_buffer_core::sink::{EventSink, EventSinks};

use crate::ObservedError;

/// Operating mode of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferMode {
    /// Never buffer; `wait_for_failover_end` always returns immediately.
    Disabled,
    /// Run the full decision logic and count what would have happened, but
    /// never block a request and never take an admission slot.
    DryRun,
    /// Buffer requests during failovers.
    #[default]
    Enabled,
}

/// Classifier applied to the caller's observed error to decide whether the
/// failover looks like a reparent (a deliberate primary change) rather than
/// an unplanned outage. The verdict is forwarded to
/// [`crate::TopologyWatcher::mark_shard_not_serving`].
pub type ReparentClassifier = Arc<dyn Fn(&ObservedError) -> bool + Send + Sync>;

/// Configuration for the buffer.
#[derive(Clone)]
pub struct BufferConfig {
    /// Total admission slots shared by all shards of the process.
    pub(crate) size: usize,
    /// Maximum time a single request stays buffered.
    pub(crate) window: Duration,
    /// Absolute cap on a BUFFERING phase before the queue is force-drained.
    pub(crate) max_failover_duration: Duration,
    /// Minimum gap between failovers; anything closer is treated as thrash
    /// and not buffered.
    pub(crate) min_time_between_failovers: Duration,
    /// Parallelism of the drain.
    pub(crate) drain_concurrency: usize,
    /// Operating mode.
    pub(crate) mode: BufferMode,
    /// Optional reparent classifier for observed errors.
    pub(crate) reparent_classifier: Option<ReparentClassifier>,
    /// Event sinks.
    pub(crate) sinks: EventSinks,
}

impl BufferConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> BufferConfigBuilder {
        BufferConfigBuilder::new()
    }

    /// Operating mode of the buffer.
    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    /// Total admission slots shared by all shards.
    pub fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn due_to_reparenting(&self, err: Option<&ObservedError>) -> bool {
        match (&self.reparent_classifier, err) {
            (Some(classifier), Some(err)) => classifier(err),
            _ => false,
        }
    }
}

/// Builder for [`BufferConfig`].
pub struct BufferConfigBuilder {
    size: usize,
    window: Duration,
    max_failover_duration: Duration,
    min_time_between_failovers: Duration,
    drain_concurrency: usize,
    mode: BufferMode,
    reparent_classifier: Option<ReparentClassifier>,
    sinks: EventSinks,
}

impl BufferConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            size: 1000,
            window: Duration::from_secs(10),
            max_failover_duration: Duration::from_secs(20),
            min_time_between_failovers: Duration::from_secs(60),
            drain_concurrency: 1,
            mode: BufferMode::Enabled,
            reparent_classifier: None,
            sinks: EventSinks::new(),
        }
    }

    /// Sets the total number of admission slots shared by all shards.
    ///
    /// Default: 1000
    pub fn size(mut self, size: usize) -> Self {
        self.size = size.max(1);
        self
    }

    /// Sets the maximum time a single request stays buffered.
    ///
    /// Default: 10s
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Sets the absolute cap on a BUFFERING phase. When it is reached the
    /// queue is drained even though no end-of-failover event arrived.
    ///
    /// Default: 20s
    pub fn max_failover_duration(mut self, duration: Duration) -> Self {
        self.max_failover_duration = duration;
        self
    }

    /// Sets the anti-thrash threshold: if buffering stopped, or a primary
    /// change was observed, more recently than this, new failover hints are
    /// ignored.
    ///
    /// Default: 60s
    pub fn min_time_between_failovers(mut self, duration: Duration) -> Self {
        self.min_time_between_failovers = duration;
        self
    }

    /// Sets how many buffered requests are released in parallel during the
    /// drain. Kept deliberately low to avoid a thundering herd on the new
    /// primary.
    ///
    /// Default: 1
    pub fn drain_concurrency(mut self, concurrency: usize) -> Self {
        self.drain_concurrency = concurrency.max(1);
        self
    }

    /// Sets the operating mode.
    ///
    /// Default: [`BufferMode::Enabled`]
    pub fn mode(mut self, mode: BufferMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the classifier that decides whether an observed error indicates
    /// a deliberate reparent. The verdict is passed to the topology watcher
    /// when buffering starts; it does not affect the buffering decision
    /// itself.
    pub fn reparent_classifier<F>(mut self, f: F) -> Self
    where
        F: Fn(&ObservedError) -> bool + Send + Sync + 'static,
    {
        self.reparent_classifier = Some(Arc::new(f));
        self
    }

    /// Registers a callback for the start of a BUFFERING phase.
    ///
    /// # Callback Signature
    /// `Fn(&str, &str)` - keyspace and shard that started buffering.
    pub fn on_buffering_started<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.sinks.register(move |event: &BufferEvent| {
            if let BufferEvent::BufferingStarted { keyspace, shard, .. } = event {
                f(keyspace, shard);
            }
        });
        self
    }

    /// Registers a callback for the end of a BUFFERING phase.
    ///
    /// # Callback Signature
    /// `Fn(StopReason, Duration)` - why buffering stopped and how long the
    /// phase lasted.
    pub fn on_buffering_stopped<F>(mut self, f: F) -> Self
    where
        F: Fn(StopReason, Duration) + Send + Sync + 'static,
    {
        self.sinks.register(move |event: &BufferEvent| {
            if let BufferEvent::BufferingStopped {
                reason, duration, ..
            } = event
            {
                f(*reason, *duration);
            }
        });
        self
    }

    /// Registers a callback for every buffered request.
    ///
    /// # Callback Signature
    /// `Fn(usize)` - queue length right after the request was appended
    /// (0 in dry-run mode, which only counts).
    pub fn on_request_buffered<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.sinks.register(move |event: &BufferEvent| {
            if let BufferEvent::RequestBuffered { queue_len, .. } = event {
                f(*queue_len);
            }
        });
        self
    }

    /// Registers a callback for every evicted request.
    ///
    /// # Callback Signature
    /// `Fn(EvictReason)` - why the request was evicted.
    pub fn on_request_evicted<F>(mut self, f: F) -> Self
    where
        F: Fn(EvictReason) + Send + Sync + 'static,
    {
        self.sinks.register(move |event: &BufferEvent| {
            if let BufferEvent::RequestEvicted { reason, .. } = event {
                f(*reason);
            }
        });
        self
    }

    /// Registers a callback for every request that bypassed the buffer.
    ///
    /// # Callback Signature
    /// `Fn(SkipReason)` - why the request was not buffered.
    pub fn on_request_skipped<F>(mut self, f: F) -> Self
    where
        F: Fn(SkipReason) + Send + Sync + 'static,
    {
        self.sinks.register(move |event: &BufferEvent| {
            if let BufferEvent::RequestSkipped { reason, .. } = event {
                f(*reason);
            }
        });
        self
    }

    /// Registers a callback for every finished drain.
    ///
    /// # Callback Signature
    /// `Fn(usize, Duration)` - how many requests were released and how long
    /// the drain took.
    pub fn on_requests_drained<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.sinks.register(move |event: &BufferEvent| {
            if let BufferEvent::RequestsDrained {
                count, duration, ..
            } = event
            {
                f(*count, *duration);
            }
        });
        self
    }

    /// Registers a raw sink receiving every [`BufferEvent`].
    ///
    /// The `on_*` helpers cover the common cases; use this for sinks that
    /// fan events out themselves (test capture, custom telemetry).
    pub fn sink<S>(mut self, sink: S) -> Self
    where
        S: EventSink + 'static,
    {
        self.sinks.register(sink);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> BufferConfig {
        BufferConfig {
            size: self.size,
            window: self.window,
            max_failover_duration: self.max_failover_duration,
            min_time_between_failovers: self.min_time_between_failovers,
            drain_concurrency: self.drain_concurrency,
            mode: self.mode,
            reparent_classifier: self.reparent_classifier,
            sinks: self.sinks,
        }
    }
}

impl Default for BufferConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
