//! Observability for the replication storage core
//!
//! Structured JSON logging only. Logging is read-only: it never changes
//! the outcome of the operation that emits it.
//!
//! ```ignore
//! use aerorepl::observability::{log_event, Event};
//!
//! log_event(Event::CollectionCreated, &[("ns", "local.oplog.rs")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

/// Log a lifecycle event with fields
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_failure() {
        Severity::Error
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

/// Log a lifecycle event at TRACE
pub fn trace_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(Severity::Trace, event.as_str(), fields);
}
