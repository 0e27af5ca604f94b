//! Lazy, cached, randomly accessible record store
//!
//! A `Store` turns a one-pass producer into an artifact on disk the first
//! time its records are needed, and serves every later scan or lookup from
//! that artifact without running the producer again.
//!
//! # States
//!
//! - `Absent`: no complete artifact. A partial build only ever exists as
//!   `<path>.tmp`, so partial collapses into absent.
//! - `Building`: another holder has the build lock.
//! - `Complete`: a published artifact exists. It is never modified.
//!
//! # Rules
//!
//! - `iterate()` streams while building; lookups build fully first
//! - `count()` never builds
//! - A damaged artifact is an integrity error and is only replaced by an
//!   explicit `rebuild()`
//! - At most one build runs per artifact path; concurrent first callers
//!   wait on the build lock and then read the published artifact
//!
//! A thread that is still consuming a building iteration must not call
//! lookups on the same store: the lookup would wait on the lock that the
//! iteration holds.

mod config;
mod iter;
mod lock;
mod producer;

pub use config::{CountHints, StoreConfig, StoreSettings};
pub use iter::RecordIter;
pub use lock::BuildLock;
pub use producer::{Produced, Producer};

use std::collections::HashSet;
use std::fmt;
use std::ops::{Bound, RangeBounds};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::artifact::{probe, ArtifactInfo, ArtifactReader, LogCursor, Probe, VerifyReport};
use crate::errors::{StoreError, StoreErrorCode, StoreResult};
use crate::observability::{log_event_with_fields, Event};
use crate::record::Record;

use iter::BuildSession;

/// Externally visible store state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// No complete artifact
    Absent,
    /// Build lock held by another thread or process
    Building,
    /// Artifact published
    Complete,
}

/// Result of a keyed lookup; the shape follows the index's uniqueness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<R> {
    /// Unique index: at most one record
    Unique(Option<R>),
    /// Non-unique index: every match, in log order
    Many(Vec<R>),
}

impl<R> Lookup<R> {
    pub fn len(&self) -> usize {
        match self {
            Lookup::Unique(found) => usize::from(found.is_some()),
            Lookup::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First match in log order
    pub fn into_first(self) -> Option<R> {
        match self {
            Lookup::Unique(found) => found,
            Lookup::Many(records) => records.into_iter().next(),
        }
    }

    /// All matches in log order
    pub fn into_vec(self) -> Vec<R> {
        match self {
            Lookup::Unique(found) => found.into_iter().collect(),
            Lookup::Many(records) => records,
        }
    }
}

/// Durable cache over a producer of `R` records.
pub struct Store<R: Record> {
    config: StoreConfig,
    producer: Box<dyn Producer<R>>,
    cached: Mutex<Option<Arc<ArtifactReader<R>>>>,
}

impl<R: Record> Store<R> {
    /// Creates a store. Nothing is read or built until first use.
    pub fn new<P>(config: StoreConfig, producer: P) -> StoreResult<Self>
    where
        P: Producer<R> + 'static,
    {
        config.validate::<R>()?;
        Ok(Self {
            config,
            producer: Box::new(producer),
            cached: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        self.config.path()
    }

    pub(crate) fn producer(&self) -> &dyn Producer<R> {
        self.producer.as_ref()
    }

    fn cache(&self) -> MutexGuard<'_, Option<Arc<ArtifactReader<R>>>> {
        self.cached.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn invalidate(&self) {
        *self.cache() = None;
    }

    /// Whether a complete artifact exists. Reads only the footer; never
    /// builds.
    pub fn built(&self) -> bool {
        matches!(probe(self.path()), Ok(Probe::Complete { .. }))
    }

    /// Current state. A damaged artifact reports `Absent`.
    pub fn state(&self) -> StoreResult<StoreState> {
        if self.built() {
            return Ok(StoreState::Complete);
        }
        if BuildLock::is_held_elsewhere(self.path())? {
            return Ok(StoreState::Building);
        }
        Ok(StoreState::Absent)
    }

    /// Opens the complete artifact without building.
    ///
    /// The path is probed on every call so an artifact removed or replaced
    /// from outside is noticed; the open reader is reused while the footer
    /// is unchanged.
    fn reader(&self) -> StoreResult<Arc<ArtifactReader<R>>> {
        let mut cached = self.cache();

        let probed = probe(self.path()).map_err(|e| StoreError::integrity_io(self.path(), e));
        let footer = match self.report_integrity(probed)? {
            Probe::Complete { footer, .. } => footer,
            Probe::Missing => {
                *cached = None;
                return Err(StoreError::not_built(self.path()));
            }
            Probe::Invalid(reason) => {
                *cached = None;
                return self.report_integrity(Err(StoreError::integrity(format!(
                    "Incomplete or damaged artifact at {}: {}",
                    self.path().display(),
                    reason
                ))));
            }
        };

        if let Some(reader) = cached.as_ref() {
            if *reader.footer() == footer {
                return Ok(Arc::clone(reader));
            }
        }

        let reader = self.report_integrity(self.open_checked())?;
        let reader = Arc::new(reader);
        *cached = Some(Arc::clone(&reader));
        Ok(reader)
    }

    fn open_checked(&self) -> StoreResult<ArtifactReader<R>> {
        let reader = ArtifactReader::open(self.path())?;

        for spec in self.config.indexes() {
            match reader.index(&spec.field) {
                Some(tree) if tree.is_unique() == spec.unique => {}
                _ => {
                    return Err(StoreError::integrity(format!(
                        "Artifact has no {} index over '{}'",
                        if spec.unique { "unique" } else { "non-unique" },
                        spec.field
                    )))
                }
            }
        }

        if self.config.settings().verify_on_open {
            reader.verify()?;
        }

        log_event_with_fields(
            Event::ArtifactOpened,
            &[
                ("path", self.path().display().to_string().as_str()),
                ("records", reader.record_count().to_string().as_str()),
            ],
        );
        Ok(reader)
    }

    fn report_integrity<T>(&self, result: StoreResult<T>) -> StoreResult<T> {
        if let Err(e) = &result {
            if e.code() == StoreErrorCode::Integrity {
                log_event_with_fields(
                    Event::IntegrityFailure,
                    &[
                        ("path", self.path().display().to_string().as_str()),
                        ("error", e.to_string().as_str()),
                    ],
                );
            }
        }
        result
    }

    fn try_reader(&self) -> StoreResult<Option<Arc<ArtifactReader<R>>>> {
        match self.reader() {
            Ok(reader) => Ok(Some(reader)),
            Err(e) if e.code() == StoreErrorCode::NotBuilt => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn acquire_lock(&self) -> StoreResult<BuildLock> {
        BuildLock::acquire(self.path(), self.config.settings().lock_timeout())
    }

    /// Returns the complete artifact, building it synchronously first if
    /// needed.
    fn ensure_built(&self) -> StoreResult<Arc<ArtifactReader<R>>> {
        if let Some(reader) = self.try_reader()? {
            return Ok(reader);
        }

        let lock = self.acquire_lock()?;
        // Another builder may have finished while we waited
        if let Some(reader) = self.try_reader()? {
            self.log_build_skipped();
            return Ok(reader);
        }

        BuildSession::start(self, lock)?.run_to_end()?;
        self.reader()
    }

    fn log_build_skipped(&self) {
        log_event_with_fields(
            Event::BuildSkipped,
            &[("path", self.path().display().to_string().as_str())],
        );
    }

    /// Number of records in the complete artifact.
    ///
    /// Fails with `NotBuilt` when there is none; never builds.
    pub fn count(&self) -> StoreResult<u64> {
        Ok(self.reader()?.record_count())
    }

    /// Record count if the artifact is complete, `None` otherwise.
    pub fn count_if_built(&self) -> StoreResult<Option<u64>> {
        Ok(self.try_reader()?.map(|reader| reader.record_count()))
    }

    /// Every record in producer order.
    ///
    /// Streams the artifact when it is complete. Otherwise takes the build
    /// lock and builds while yielding; records reach the caller as they are
    /// produced.
    pub fn iterate(&self) -> StoreResult<RecordIter<'_, R>> {
        if let Some(reader) = self.try_reader()? {
            return Ok(RecordIter::stored(reader.cursor()?));
        }

        let lock = self.acquire_lock()?;
        if let Some(reader) = self.try_reader()? {
            self.log_build_skipped();
            drop(lock);
            return Ok(RecordIter::stored(reader.cursor()?));
        }

        Ok(RecordIter::building(BuildSession::start(self, lock)?))
    }

    /// Looks up `value` in the index over `field`, building first if needed.
    pub fn get_by_key(&self, field: &str, value: &str) -> StoreResult<Lookup<R>> {
        let spec = self
            .config
            .index_spec(field)
            .ok_or_else(|| StoreError::unknown_index(field))?;
        let unique = spec.unique;

        let reader = self.ensure_built()?;
        let offsets = reader.lookup(field, value)?;
        let records = reader.read_indexed(field, value, offsets)?;

        if unique {
            Ok(Lookup::Unique(records.into_iter().next()))
        } else {
            Ok(Lookup::Many(records))
        }
    }

    /// Looks up `key` on the primary lookup field.
    pub fn get(&self, key: &str) -> StoreResult<Option<R>> {
        let field = self.config.lookup_field().to_string();
        self.get_by_key(&field, key).map(Lookup::into_first)
    }

    /// Looks up many primary keys. Found records come back in log order;
    /// missing keys are skipped.
    pub fn get_many<I, K>(&self, keys: I) -> StoreResult<Vec<R>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let field = self.config.lookup_field();
        let reader = self.ensure_built()?;

        let wanted: HashSet<String> = keys.into_iter().map(|k| k.as_ref().to_string()).collect();
        let mut offsets = Vec::with_capacity(wanted.len());
        for key in &wanted {
            offsets.extend_from_slice(reader.lookup(field, key)?);
        }
        offsets.sort_unstable();
        offsets.dedup();

        let records = reader.read_offsets(&offsets)?;
        for (record, offset) in records.iter().zip(&offsets) {
            let matches = record
                .key(field)
                .map(|key| wanted.contains(key.as_ref()))
                .unwrap_or(false);
            if !matches {
                return Err(StoreError::integrity_at_offset(
                    *offset,
                    format!("Index '{}' points at a record with a different key", field),
                ));
            }
        }
        Ok(records)
    }

    /// The record at log position `position`, building first if needed.
    pub fn get_at(&self, position: u64) -> StoreResult<Option<R>> {
        self.ensure_built()?.read_position(position)
    }

    /// Records at log positions within `range`, building first if needed.
    pub fn iter_range<B: RangeBounds<u64>>(&self, range: B) -> StoreResult<LogCursor<R>> {
        let reader = self.ensure_built()?;
        let count = reader.record_count();

        let start = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&n) => n.saturating_add(1),
            Bound::Excluded(&n) => n,
            Bound::Unbounded => count,
        };

        let start = start.min(count);
        let end = end.clamp(start, count);
        reader.cursor_from(start, end - start)
    }

    /// Builds the artifact now if it is not complete.
    pub fn build(&self) -> StoreResult<()> {
        self.ensure_built().map(|_| ())
    }

    /// Replaces the artifact, damaged or not, with a fresh build.
    ///
    /// The new artifact is published by the same rename as any build, so
    /// the previous file stays in place until the rebuild succeeds.
    pub fn rebuild(&self) -> StoreResult<()> {
        let lock = self.acquire_lock()?;

        log_event_with_fields(
            Event::RebuildStart,
            &[("path", self.path().display().to_string().as_str())],
        );
        self.invalidate();

        BuildSession::start(self, lock)?.run_to_end()
    }

    /// Full integrity scan of the complete artifact. Never builds.
    pub fn verify(&self) -> StoreResult<VerifyReport> {
        let reader = self.reader()?;
        let report = self.report_integrity(reader.verify())?;

        log_event_with_fields(
            Event::VerifyComplete,
            &[
                ("path", self.path().display().to_string().as_str()),
                ("records", report.records.to_string().as_str()),
                ("indexes", report.indexes.to_string().as_str()),
            ],
        );
        Ok(report)
    }

    /// Metadata of the complete artifact. Never builds.
    pub fn info(&self) -> StoreResult<ArtifactInfo> {
        Ok(self.reader()?.info())
    }
}

impl<R: Record> fmt::Debug for Store<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path())
            .field("lookup_field", &self.config.lookup_field())
            .finish()
    }
}

impl<'s, R: Record> IntoIterator for &'s Store<R> {
    type Item = StoreResult<R>;
    type IntoIter = RecordIter<'s, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.iterate().unwrap_or_else(RecordIter::failed)
    }
}
