//! Observability for store builds and reads
//!
//! - Structured logging (JSON lines on stderr)
//! - Typed lifecycle events
//! - Scope-based begin/complete tracing
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. No async or background threads
//! 4. Deterministic output
//!
//! # Usage
//!
//! ```ignore
//! use irstore::observability::{Logger, Event, ObservationScope, log_event_with_fields};
//!
//! Logger::info("DATASET_READY", &[("name", "isearch")]);
//! log_event_with_fields(Event::LockWait, &[("path", "/data/docs.irs")]);
//!
//! let scope = ObservationScope::new("STORE_BUILD");
//! // ... do work ...
//! scope.complete();
//! ```

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity, LOG_LEVEL_ENV};
pub use scope::{ObservationScope, Timer};

fn event_severity(event: Event) -> Severity {
    if event.is_fatal() {
        Severity::Fatal
    } else if event.is_warning() {
        Severity::Warn
    } else {
        Severity::Info
    }
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event_severity(event), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_severity() {
        assert_eq!(event_severity(Event::IntegrityFailure), Severity::Fatal);
        assert_eq!(event_severity(Event::BuildAbandoned), Severity::Warn);
        assert_eq!(event_severity(Event::BuildProgress), Severity::Info);
    }

    #[test]
    fn test_log_event() {
        log_event_with_fields(Event::BuildProgress, &[("records", "10000")]);
    }
}
