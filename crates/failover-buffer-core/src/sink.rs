//! The sink capability buffer events are delivered through.
//!
//! Several components of one shard buffer emit for the same `(keyspace,
//! shard)` pair: request threads, the timeout watcher, the drain worker.
//! They all write to the [`EventSinks`] captured in the configuration, so a
//! test can observe a buffer simply by registering a closure next to the
//! rest of its config.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::events::BufferEvent;

/// Receives every event a buffer emits.
///
/// Any `Fn(&BufferEvent)` closure is a sink, which is the usual way to
/// attach one:
///
/// ```rust
/// use failover_buffer_core::{BufferEvent, EventSinks};
///
/// let mut sinks = EventSinks::new();
/// sinks.register(|event: &BufferEvent| {
///     println!("{}/{}: {}", event.keyspace(), event.shard(), event.kind());
/// });
/// ```
pub trait EventSink: Send + Sync {
    /// Called once per event, on the thread that produced it. Keep it cheap:
    /// request threads wait for it to return.
    fn record(&self, event: &BufferEvent);
}

impl<F> EventSink for F
where
    F: Fn(&BufferEvent) + Send + Sync,
{
    fn record(&self, event: &BufferEvent) {
        self(event)
    }
}

/// The sinks registered on one buffer.
///
/// Events are fanned out in registration order. A sink that panics is
/// isolated: the remaining sinks still run, and the emitting thread
/// survives, since a broken telemetry hook must not take buffered requests
/// down with it.
#[derive(Clone, Default)]
pub struct EventSinks {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventSinks {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink.
    pub fn register<S>(&mut self, sink: S)
    where
        S: EventSink + 'static,
    {
        self.sinks.push(Arc::new(sink));
    }

    /// Hands `event` to every registered sink.
    pub fn record(&self, event: &BufferEvent) {
        for sink in &self.sinks {
            if catch_unwind(AssertUnwindSafe(|| sink.record(event))).is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    keyspace = event.keyspace(),
                    shard = event.shard(),
                    event = event.kind(),
                    "buffer event sink panicked"
                );
            }
        }
    }

    /// True if no sink is registered.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Number of registered sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }
}
