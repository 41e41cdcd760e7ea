//! Event sink system for observability.
//!
//! Run and stage lifecycle notifications (`run.started`, `stage.completed`,
//! `event.kept`, ...) are delivered to an [`EventSink`] owned by the run.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
