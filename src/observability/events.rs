//! Observable store lifecycle events
//!
//! Events are explicit and typed. Build begin/complete/failed lines come
//! from the `STORE_BUILD` observation scope; the events here cover what
//! happens around a build.

use std::fmt;

/// Observable events in a store's life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Build
    /// Periodic progress while a build is running
    BuildProgress,
    /// Iteration dropped before the producer was exhausted
    BuildAbandoned,

    // Locking
    /// Another process or thread holds the build lock; waiting
    LockWait,
    /// Build lock acquired
    LockAcquired,
    /// Artifact appeared while waiting for the lock
    BuildSkipped,

    // Artifact
    /// Complete artifact opened for reading
    ArtifactOpened,
    /// Artifact failed an integrity check (FATAL)
    IntegrityFailure,
    /// Explicit rebuild removed the existing artifact
    RebuildStart,
    /// Full verification scan finished
    VerifyComplete,

    // Configuration
    /// Settings loaded from a file
    SettingsLoaded,
    /// Count hints loaded from a file
    CountHintsLoaded,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BuildProgress => "STORE_BUILD_PROGRESS",
            Event::BuildAbandoned => "STORE_BUILD_ABANDONED",

            Event::LockWait => "STORE_LOCK_WAIT",
            Event::LockAcquired => "STORE_LOCK_ACQUIRED",
            Event::BuildSkipped => "STORE_BUILD_SKIPPED",

            Event::ArtifactOpened => "STORE_ARTIFACT_OPENED",
            Event::IntegrityFailure => "STORE_INTEGRITY_FAILURE",
            Event::RebuildStart => "STORE_REBUILD_BEGIN",
            Event::VerifyComplete => "STORE_VERIFY_COMPLETE",

            Event::SettingsLoaded => "SETTINGS_LOADED",
            Event::CountHintsLoaded => "COUNT_HINTS_LOADED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::IntegrityFailure)
    }

    /// Returns true for events that mark an interrupted or deferred operation
    pub fn is_warning(&self) -> bool {
        matches!(self, Event::BuildAbandoned | Event::LockWait)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_have_string_representation() {
        let events = [
            Event::BuildProgress,
            Event::BuildAbandoned,
            Event::LockWait,
            Event::LockAcquired,
            Event::BuildSkipped,
            Event::ArtifactOpened,
            Event::IntegrityFailure,
            Event::RebuildStart,
            Event::VerifyComplete,
            Event::SettingsLoaded,
            Event::CountHintsLoaded,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_fatal_events() {
        assert!(Event::IntegrityFailure.is_fatal());
        assert!(!Event::BuildProgress.is_fatal());
        assert!(!Event::BuildAbandoned.is_fatal());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::LockWait), "STORE_LOCK_WAIT");
        assert_eq!(format!("{}", Event::RebuildStart), "STORE_REBUILD_BEGIN");
    }
}
