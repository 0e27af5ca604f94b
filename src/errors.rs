//! Store error types
//!
//! Error codes:
//! - IRSTORE_NOT_BUILT (ERROR)
//! - IRSTORE_INTEGRITY (FATAL)
//! - IRSTORE_PRODUCER_FAILED (ERROR)
//! - IRSTORE_LOCK_TIMEOUT (ERROR)
//! - IRSTORE_IO_ERROR (ERROR)
//! - IRSTORE_UNKNOWN_INDEX (ERROR)
//! - IRSTORE_DUPLICATE_KEY (ERROR)
//! - IRSTORE_CONFIG_INVALID (ERROR)
//!
//! Integrity failures are never repaired automatically. Only an explicit
//! rebuild replaces a corrupt artifact.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::Path;

use crate::record::CodecError;

/// Boxed error raised by a producer while a build drains it.
pub type ProducerError = Box<dyn StdError + Send + Sync>;

/// Severity levels for store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, the store stays usable
    Error,
    /// The artifact cannot be trusted until rebuilt
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Store error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// Lookup-style operation against an artifact that does not exist
    NotBuilt,
    /// Artifact claims completeness but fails a consistency check
    Integrity,
    /// The producer failed while being drained
    ProducerFailed,
    /// Bounded wait on the build lock expired
    LockTimeout,
    /// Filesystem failure outside of a complete artifact
    Io,
    /// Lookup on a field that has no index
    UnknownIndex,
    /// A unique index received the same value twice during a build
    DuplicateKey,
    /// Settings or store configuration rejected
    ConfigInvalid,
}

impl StoreErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StoreErrorCode::NotBuilt => "IRSTORE_NOT_BUILT",
            StoreErrorCode::Integrity => "IRSTORE_INTEGRITY",
            StoreErrorCode::ProducerFailed => "IRSTORE_PRODUCER_FAILED",
            StoreErrorCode::LockTimeout => "IRSTORE_LOCK_TIMEOUT",
            StoreErrorCode::Io => "IRSTORE_IO_ERROR",
            StoreErrorCode::UnknownIndex => "IRSTORE_UNKNOWN_INDEX",
            StoreErrorCode::DuplicateKey => "IRSTORE_DUPLICATE_KEY",
            StoreErrorCode::ConfigInvalid => "IRSTORE_CONFIG_INVALID",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StoreErrorCode::Integrity => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Store error with full context
#[derive(Debug)]
pub struct StoreError {
    code: StoreErrorCode,
    message: String,
    details: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl StoreError {
    fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    fn with_source(mut self, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The artifact at `path` is not complete
    pub fn not_built(path: &Path) -> Self {
        Self::new(StoreErrorCode::NotBuilt, "Store artifact is not built")
            .with_details(format!("path: {}", path.display()))
    }

    /// Artifact consistency check failed
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Integrity, message)
    }

    /// Artifact consistency check failed at a byte offset
    pub fn integrity_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Integrity, reason)
            .with_details(format!("byte_offset: {}", offset))
    }

    /// Artifact consistency check failed while decoding a record
    pub fn integrity_codec(offset: u64, source: CodecError) -> Self {
        Self::new(StoreErrorCode::Integrity, "Record failed to decode")
            .with_details(format!("byte_offset: {}", offset))
            .with_source(source)
    }

    /// Reading a supposedly complete artifact failed at the filesystem level
    pub fn integrity_io(path: &Path, source: io::Error) -> Self {
        Self::new(StoreErrorCode::Integrity, "Failed to read store artifact")
            .with_details(format!("path: {}", path.display()))
            .with_source(source)
    }

    /// The producer raised while being drained
    pub fn producer(source: ProducerError) -> Self {
        Self {
            code: StoreErrorCode::ProducerFailed,
            message: "Producer failed during build".to_string(),
            details: None,
            source: Some(source),
        }
    }

    /// The build lock could not be acquired in time
    pub fn lock_timeout(lock_path: &Path, waited_ms: u64) -> Self {
        Self::new(StoreErrorCode::LockTimeout, "Timed out waiting for build lock")
            .with_details(format!(
                "lock_path: {}, waited_ms: {}",
                lock_path.display(),
                waited_ms
            ))
    }

    /// Filesystem failure while building or locking
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(StoreErrorCode::Io, message).with_source(source)
    }

    /// Filesystem failure tied to a path
    pub fn io_error_at_path(path: &Path, source: io::Error) -> Self {
        Self::new(StoreErrorCode::Io, format!("I/O failure on {}", path.display()))
            .with_source(source)
    }

    /// No index is declared for `field`
    pub fn unknown_index(field: &str) -> Self {
        Self::new(StoreErrorCode::UnknownIndex, "No index declared for field")
            .with_details(format!("field: {}", field))
    }

    /// A unique index received `value` twice
    pub fn duplicate_key(field: &str, value: &str) -> Self {
        Self::new(
            StoreErrorCode::DuplicateKey,
            "Duplicate value for unique index",
        )
        .with_details(format!("field: {}, value: {}", field, value))
    }

    /// Configuration rejected
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::ConfigInvalid, message)
    }

    /// Returns the error code
    pub fn code(&self) -> StoreErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether the artifact is unusable until rebuilt
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl StdError for StoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StoreErrorCode::NotBuilt.code(), "IRSTORE_NOT_BUILT");
        assert_eq!(StoreErrorCode::Integrity.code(), "IRSTORE_INTEGRITY");
        assert_eq!(StoreErrorCode::ProducerFailed.code(), "IRSTORE_PRODUCER_FAILED");
        assert_eq!(StoreErrorCode::LockTimeout.code(), "IRSTORE_LOCK_TIMEOUT");
        assert_eq!(StoreErrorCode::DuplicateKey.code(), "IRSTORE_DUPLICATE_KEY");
    }

    #[test]
    fn test_only_integrity_is_fatal() {
        assert!(StoreError::integrity("bad footer").is_fatal());
        assert!(!StoreError::not_built(Path::new("/tmp/x.irs")).is_fatal());
        assert!(!StoreError::unknown_index("title").is_fatal());
    }

    #[test]
    fn test_display_contains_context() {
        let err = StoreError::integrity_at_offset(4096, "checksum mismatch");
        let display = err.to_string();
        assert!(display.contains("IRSTORE_INTEGRITY"));
        assert!(display.contains("FATAL"));
        assert!(display.contains("checksum mismatch"));
        assert!(display.contains("byte_offset: 4096"));
    }

    #[test]
    fn test_producer_error_keeps_source() {
        let err = StoreError::producer("tarball truncated".into());
        assert_eq!(err.code(), StoreErrorCode::ProducerFailed);
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("tarball truncated"));
        assert!(err.to_string().contains("tarball truncated"));
    }
}
