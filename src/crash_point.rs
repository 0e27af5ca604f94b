//! Crash point injection for testing build interruption
//!
//! When `IRSTORE_CRASH_POINT` names a crash point, reaching it terminates the
//! process via `std::process::abort()`: no cleanup, no unwinding, no
//! destructors. Tests use this to leave a build half-written and then check
//! that the next process sees the store as not built.
//!
//! ```bash
//! IRSTORE_CRASH_POINT=build_before_rename cargo test --test store_crash
//! ```

use std::sync::OnceLock;

/// Environment variable naming the active crash point
pub const CRASH_POINT_ENV: &str = "IRSTORE_CRASH_POINT";

static CRASH_POINT: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn get_crash_point() -> Option<&'static str> {
    CRASH_POINT
        .get_or_init(|| std::env::var(CRASH_POINT_ENV).ok())
        .as_deref()
}

/// Returns true if `IRSTORE_CRASH_POINT` equals the given name.
#[inline]
pub fn crash_point_enabled(name: &str) -> bool {
    get_crash_point().map(|p| p == name).unwrap_or(false)
}

/// Aborts the process if the named crash point is enabled.
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        eprintln!("[CRASH] Triggering crash at point: {}", name);
        std::process::abort();
    }
}

/// All defined crash point names
pub mod points {
    /// After the first record frame is written to the temporary file
    pub const BUILD_AFTER_FIRST_RECORD: &str = "build_after_first_record";
    /// After the log is complete, before indexes are written
    pub const BUILD_BEFORE_INDEX: &str = "build_before_index";
    /// After the footer is fsynced, before the rename publishes it
    pub const BUILD_BEFORE_RENAME: &str = "build_before_rename";

    pub fn all() -> &'static [&'static str] {
        &[BUILD_AFTER_FIRST_RECORD, BUILD_BEFORE_INDEX, BUILD_BEFORE_RENAME]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crash_point_disabled_by_default() {
        // Unit tests never set the variable
        assert!(!crash_point_enabled("nonexistent_crash_point"));
        maybe_crash("nonexistent_crash_point");
    }

    #[test]
    fn test_point_names_unique() {
        let all = points::all();
        let mut names: Vec<_> = all.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), all.len());
    }
}
