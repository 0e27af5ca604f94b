//! Artifact writer
//!
//! A build writes everything to `<path>.tmp`:
//!
//! 1. Header (magic + schema)
//! 2. One frame per record, in producer order, collecting index entries and
//!    positions in memory
//! 3. Index section
//! 4. Positions table
//! 5. Footer
//! 6. fsync the file
//! 7. Rename `<path>.tmp` → `<path>`
//! 8. fsync the parent directory
//!
//! Step 7 is the only step that makes the artifact visible. A writer dropped
//! before `finish` removes its temporary file, so an abandoned or failed
//! build leaves nothing at the artifact path.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::checksum::compute_checksum_parts;
use super::frame::encode_frame;
use super::index::{IndexSet, IndexSpec, LogOffset};
use super::layout::{encode_header, Footer};
use super::temp_path;
use crate::crash_point::{maybe_crash, points};
use crate::errors::{StoreError, StoreResult};
use crate::record::{FieldWriter, Record};

/// Writes one artifact for record type `R`.
pub struct ArtifactWriter<R> {
    final_path: PathBuf,
    tmp_path: PathBuf,
    file: BufWriter<File>,
    offset: u64,
    log_start: u64,
    indexes: IndexSet,
    positions: Vec<LogOffset>,
    compression_level: i32,
    scratch: Vec<u8>,
    finished: bool,
    _record: PhantomData<fn(&R)>,
}

impl<R: Record> ArtifactWriter<R> {
    /// Starts a new temporary artifact next to `path`, truncating any
    /// leftover from an earlier abandoned build.
    pub fn create(path: &Path, specs: &[IndexSpec], compression_level: i32) -> StoreResult<Self> {
        let tmp_path = temp_path(path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| StoreError::io_error_at_path(&tmp_path, e))?;

        let mut writer = Self {
            final_path: path.to_path_buf(),
            tmp_path,
            file: BufWriter::new(file),
            offset: 0,
            log_start: 0,
            indexes: IndexSet::from_specs(specs),
            positions: Vec::new(),
            compression_level,
            scratch: Vec::new(),
            finished: false,
            _record: PhantomData,
        };

        let header = encode_header(R::FIELDS);
        writer.write_bytes(&header)?;
        writer.log_start = writer.offset;
        Ok(writer)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> StoreResult<()> {
        self.file
            .write_all(bytes)
            .map_err(|e| StoreError::io_error_at_path(&self.tmp_path, e))?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    /// Number of records appended so far
    pub fn record_count(&self) -> u64 {
        self.positions.len() as u64
    }

    /// Appends one record and indexes it.
    ///
    /// Returns the record's log offset.
    pub fn append(&mut self, record: &R) -> StoreResult<LogOffset> {
        let offset = self.offset;

        for (field, tree) in self.indexes.iter_mut() {
            let key = record.key(field).ok_or_else(|| {
                StoreError::config_invalid(format!("Indexed field '{}' is not declared", field))
            })?;
            if !tree.insert(&key, offset) {
                return Err(StoreError::duplicate_key(field, &key));
            }
        }

        let mut body = FieldWriter::with_buffer(std::mem::take(&mut self.scratch));
        record.encode(&mut body);
        let frame = encode_frame(body.as_bytes(), self.compression_level)
            .map_err(|e| StoreError::io_error("Failed to compress record", e))?;
        self.scratch = body.into_bytes();

        self.write_bytes(&frame)?;
        self.positions.push(offset);

        if self.positions.len() == 1 {
            maybe_crash(points::BUILD_AFTER_FIRST_RECORD);
        }
        Ok(offset)
    }

    /// Writes indexes, positions and footer, then atomically publishes the
    /// artifact at its final path.
    pub fn finish(mut self) -> StoreResult<Footer> {
        let log_end = self.offset;
        maybe_crash(points::BUILD_BEFORE_INDEX);

        let index_section = self.indexes.encode();
        let positions_offset = log_end + index_section.len() as u64;
        let mut positions_section = Vec::with_capacity(self.positions.len() * 8);
        for position in &self.positions {
            positions_section.extend_from_slice(&position.to_le_bytes());
        }

        let footer = Footer {
            log_start: self.log_start,
            log_end,
            positions_offset,
            record_count: self.positions.len() as u64,
            built_at_millis: Utc::now().timestamp_millis(),
            sections_crc: compute_checksum_parts(&[&index_section, &positions_section]),
        };

        self.write_bytes(&index_section)?;
        self.write_bytes(&positions_section)?;
        self.write_bytes(&footer.encode())?;

        self.file
            .flush()
            .map_err(|e| StoreError::io_error_at_path(&self.tmp_path, e))?;
        // fsync before the rename makes the artifact visible
        self.file
            .get_ref()
            .sync_all()
            .map_err(|e| StoreError::io_error_at_path(&self.tmp_path, e))?;

        maybe_crash(points::BUILD_BEFORE_RENAME);
        fs::rename(&self.tmp_path, &self.final_path)
            .map_err(|e| StoreError::io_error_at_path(&self.final_path, e))?;
        self.finished = true;

        if let Some(parent) = self.final_path.parent() {
            fsync_dir(parent)?;
        }

        Ok(footer)
    }
}

impl<R> Drop for ArtifactWriter<R> {
    fn drop(&mut self) {
        if !self.finished {
            // Best effort removal - we're already in an error path
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// fsync a directory so a rename inside it is durable.
fn fsync_dir(path: &Path) -> StoreResult<()> {
    let path = if path.as_os_str().is_empty() {
        Path::new(".")
    } else {
        path
    };

    #[cfg(unix)]
    {
        let dir = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| StoreError::io_error_at_path(path, e))?;
        dir.sync_all()
            .map_err(|e| StoreError::io_error(format!("fsync directory failed: {}", path.display()), e))?;
    }
    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}
