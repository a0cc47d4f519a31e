//! Shared vocabulary of the failover-buffer crates.
//!
//! This crate holds the two things the buffer and its integrations agree on:
//! the [`events::BufferEvent`] values a buffer emits, and the
//! [`sink::EventSink`] capability those events are delivered through. Sinks
//! are handed in at configuration time; there is deliberately no
//! process-global registry, so tests capture emissions by registering a
//! closure.

pub mod events;
pub mod sink;

pub use events::{BufferEvent, EvictReason, SkipReason, StopReason};
pub use sink::{EventSink, EventSinks};
