//! Store configuration
//!
//! `StoreConfig` is fixed when the store is created. `StoreSettings` holds
//! the tunables that may come from a JSON file; `CountHints` maps collection
//! names to expected record counts for progress reporting.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::artifact::IndexSpec;
use crate::errors::{StoreError, StoreResult};
use crate::observability::{log_event_with_fields, Event};
use crate::record::Record;

/// Tunables for building and opening artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// zstd level for record frames (1..=22, default 3)
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    /// Records between progress events (default 10000)
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,

    /// Upper bound on waiting for another builder. Absent waits forever.
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,

    /// Run a full verification scan before first use of an artifact
    #[serde(default)]
    pub verify_on_open: bool,
}

fn default_compression_level() -> i32 {
    3
}
fn default_progress_every() -> u64 {
    10_000
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            compression_level: default_compression_level(),
            progress_every: default_progress_every(),
            lock_timeout_ms: None,
            verify_on_open: false,
        }
    }
}

impl StoreSettings {
    /// Load settings from a JSON file and validate them.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            StoreError::config_invalid(format!("Failed to read settings {}: {}", path.display(), e))
        })?;

        let settings: StoreSettings = serde_json::from_str(&content)
            .map_err(|e| StoreError::config_invalid(format!("Invalid settings JSON: {}", e)))?;

        settings.validate()?;

        let level = settings.compression_level.to_string();
        log_event_with_fields(
            Event::SettingsLoaded,
            &[("path", path.display().to_string().as_str()), ("compression_level", level.as_str())],
        );
        Ok(settings)
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> StoreResult<()> {
        if !(1..=22).contains(&self.compression_level) {
            return Err(StoreError::config_invalid(format!(
                "compression_level must be within 1..=22, got {}",
                self.compression_level
            )));
        }

        if self.progress_every == 0 {
            return Err(StoreError::config_invalid("progress_every must be > 0"));
        }

        Ok(())
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }
}

/// Expected record counts per collection name, used only for progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountHints(BTreeMap<String, u64>);

impl CountHints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON object of `name -> count`.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            StoreError::config_invalid(format!("Failed to read count hints {}: {}", path.display(), e))
        })?;

        let hints: CountHints = serde_json::from_str(&content)
            .map_err(|e| StoreError::config_invalid(format!("Invalid count hints JSON: {}", e)))?;

        let entries = hints.0.len().to_string();
        log_event_with_fields(
            Event::CountHintsLoaded,
            &[("path", path.display().to_string().as_str()), ("entries", entries.as_str())],
        );
        Ok(hints)
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.0.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, count: u64) {
        self.0.insert(name.into(), count);
    }
}

/// Construction-time configuration of one store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    path: PathBuf,
    lookup_field: String,
    indexes: Vec<IndexSpec>,
    count_hint: Option<u64>,
    settings: StoreSettings,
}

impl StoreConfig {
    /// A store at `path` whose primary lookup is the unique field
    /// `lookup_field`.
    pub fn new(path: impl Into<PathBuf>, lookup_field: impl Into<String>) -> Self {
        let lookup_field = lookup_field.into();
        Self {
            path: path.into(),
            indexes: vec![IndexSpec::unique(lookup_field.clone())],
            lookup_field,
            count_hint: None,
            settings: StoreSettings::default(),
        }
    }

    /// Adds an index, replacing any earlier declaration for the same field.
    pub fn with_index(mut self, spec: IndexSpec) -> Self {
        self.indexes.retain(|existing| existing.field != spec.field);
        self.indexes.push(spec);
        self
    }

    pub fn with_count_hint(mut self, count_hint: Option<u64>) -> Self {
        self.count_hint = count_hint;
        self
    }

    pub fn with_settings(mut self, settings: StoreSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lookup_field(&self) -> &str {
        &self.lookup_field
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    pub fn index_spec(&self, field: &str) -> Option<&IndexSpec> {
        self.indexes.iter().find(|spec| spec.field == field)
    }

    pub fn count_hint(&self) -> Option<u64> {
        self.count_hint
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Checks the configuration against the record shape `R`.
    pub fn validate<R: Record>(&self) -> StoreResult<()> {
        self.settings.validate()?;

        if self.path.as_os_str().is_empty() {
            return Err(StoreError::config_invalid("Artifact path is empty"));
        }

        for spec in &self.indexes {
            if !R::has_field(&spec.field) {
                return Err(StoreError::config_invalid(format!(
                    "Indexed field '{}' is not a record field",
                    spec.field
                )));
            }
        }

        match self.index_spec(&self.lookup_field) {
            Some(spec) if spec.unique => Ok(()),
            Some(_) => Err(StoreError::config_invalid(format!(
                "Lookup field '{}' must have a unique index",
                self.lookup_field
            ))),
            None => Err(StoreError::config_invalid(format!(
                "Lookup field '{}' is not indexed",
                self.lookup_field
            ))),
        }
    }
}
