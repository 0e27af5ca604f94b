//! Record iteration, streaming or building
//!
//! `RecordIter` either streams a complete artifact or drives a build:
//! each record pulled from the producer is appended to the temporary
//! artifact and then handed to the caller. Dropping the iterator before the
//! producer is exhausted abandons the build; the temporary file is removed
//! and the build lock released.

use std::fmt;

use super::lock::BuildLock;
use super::producer::Produced;
use super::Store;
use crate::artifact::{ArtifactWriter, LogCursor};
use crate::errors::{StoreError, StoreResult};
use crate::observability::{log_event_with_fields, Event, ObservationScope, Timer};
use crate::record::Record;

/// Scope name for build begin/complete/failed events
const BUILD_SCOPE: &str = "STORE_BUILD";

/// One running build. Field order is drop order: the writer removes its
/// temporary file before the lock is released.
pub(crate) struct BuildSession<'s, R: Record> {
    store: &'s Store<R>,
    records: Produced<'s, R>,
    writer: Option<ArtifactWriter<R>>,
    scope: Option<ObservationScope<'static>>,
    timer: Timer,
    path_display: String,
    _lock: BuildLock,
}

impl<'s, R: Record> BuildSession<'s, R> {
    /// Starts a build. The caller already holds the lock and has checked
    /// that no complete artifact exists.
    pub(crate) fn start(store: &'s Store<R>, lock: BuildLock) -> StoreResult<Self> {
        let config = store.config();
        let path_display = config.path().display().to_string();
        let expected = config
            .count_hint()
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let scope = ObservationScope::with_fields(
            BUILD_SCOPE,
            &[("path", path_display.as_str()), ("expected", expected.as_str())],
        );

        let writer = match ArtifactWriter::create(
            config.path(),
            config.indexes(),
            config.settings().compression_level,
        ) {
            Ok(writer) => writer,
            Err(e) => {
                scope.fail(&e.to_string());
                return Err(e);
            }
        };

        let records = match store.producer().produce() {
            Ok(records) => records,
            Err(e) => {
                let err = StoreError::producer(e);
                scope.fail(&err.to_string());
                return Err(err);
            }
        };

        Ok(Self {
            store,
            records,
            writer: Some(writer),
            scope: Some(scope),
            timer: Timer::new(),
            path_display,
            _lock: lock,
        })
    }

    /// Pulls, persists and returns the next record. `None` once the build
    /// has been published. After an error the session is finished.
    pub(crate) fn step(&mut self) -> Option<StoreResult<R>> {
        let writer = self.writer.as_mut()?;

        match self.records.next() {
            Some(Ok(record)) => match writer.append(&record) {
                Ok(_) => {
                    let written = writer.record_count();
                    self.report_progress(written);
                    Some(Ok(record))
                }
                Err(e) => Some(Err(self.fail(e))),
            },
            Some(Err(e)) => Some(Err(self.fail(StoreError::producer(e)))),
            None => self.finish().err().map(Err),
        }
    }

    /// Drains the producer without handing records out.
    pub(crate) fn run_to_end(mut self) -> StoreResult<()> {
        while let Some(step) = self.step() {
            step?;
        }
        Ok(())
    }

    fn report_progress(&self, written: u64) {
        let every = self.store.config().settings().progress_every;
        if written % every != 0 {
            return;
        }

        let records = written.to_string();
        match self.store.config().count_hint() {
            Some(expected) if expected > 0 => {
                let percent = format!("{:.1}", written as f64 * 100.0 / expected as f64);
                log_event_with_fields(
                    Event::BuildProgress,
                    &[
                        ("path", self.path_display.as_str()),
                        ("records", records.as_str()),
                        ("expected", expected.to_string().as_str()),
                        ("percent", percent.as_str()),
                    ],
                );
            }
            _ => log_event_with_fields(
                Event::BuildProgress,
                &[("path", self.path_display.as_str()), ("records", records.as_str())],
            ),
        }
    }

    fn fail(&mut self, err: StoreError) -> StoreError {
        // Dropping the writer removes the temporary file
        self.writer = None;
        if let Some(scope) = self.scope.take() {
            scope.fail(&err.to_string());
        }
        err
    }

    fn finish(&mut self) -> StoreResult<()> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => return Ok(()),
        };

        match writer.finish() {
            Ok(footer) => {
                self.store.invalidate();
                if let Some(scope) = self.scope.take() {
                    scope.complete_with_fields(&[
                        ("records", footer.record_count.to_string().as_str()),
                        ("duration_ms", self.timer.elapsed_ms().as_str()),
                    ]);
                }
                Ok(())
            }
            Err(e) => {
                if let Some(scope) = self.scope.take() {
                    scope.fail(&e.to_string());
                }
                Err(e)
            }
        }
    }
}

impl<R: Record> Drop for BuildSession<'_, R> {
    fn drop(&mut self) {
        if let Some(writer) = &self.writer {
            let records = writer.record_count().to_string();
            log_event_with_fields(
                Event::BuildAbandoned,
                &[("path", self.path_display.as_str()), ("records", records.as_str())],
            );
        }
    }
}

enum IterState<'s, R: Record> {
    Stored(LogCursor<R>),
    Building(Box<BuildSession<'s, R>>),
    Failed(Option<StoreError>),
    Done,
}

/// Records of a store in producer order.
///
/// Yields `StoreResult<R>`; the first error ends the iteration.
pub struct RecordIter<'s, R: Record> {
    state: IterState<'s, R>,
}

impl<'s, R: Record> RecordIter<'s, R> {
    pub(crate) fn stored(cursor: LogCursor<R>) -> Self {
        Self {
            state: IterState::Stored(cursor),
        }
    }

    pub(crate) fn building(session: BuildSession<'s, R>) -> Self {
        Self {
            state: IterState::Building(Box::new(session)),
        }
    }

    pub(crate) fn failed(err: StoreError) -> Self {
        Self {
            state: IterState::Failed(Some(err)),
        }
    }

    /// Whether this iteration is writing the artifact as it goes
    pub fn is_building(&self) -> bool {
        matches!(self.state, IterState::Building(_))
    }
}

impl<R: Record> Iterator for RecordIter<'_, R> {
    type Item = StoreResult<R>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = match &mut self.state {
            IterState::Stored(cursor) => cursor.next(),
            IterState::Building(session) => session.step(),
            IterState::Failed(err) => err.take().map(Err),
            IterState::Done => None,
        };

        if !matches!(item, Some(Ok(_))) {
            self.state = IterState::Done;
        }
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.state {
            IterState::Stored(cursor) => cursor.size_hint(),
            IterState::Building(_) => (0, None),
            IterState::Failed(Some(_)) => (1, Some(1)),
            IterState::Failed(None) | IterState::Done => (0, Some(0)),
        }
    }
}

impl<R: Record> fmt::Debug for RecordIter<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            IterState::Stored(_) => "stored",
            IterState::Building(_) => "building",
            IterState::Failed(_) => "failed",
            IterState::Done => "done",
        };
        f.debug_struct("RecordIter").field("state", &state).finish()
    }
}
