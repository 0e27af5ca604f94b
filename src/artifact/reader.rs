//! Artifact reader with strict corruption detection
//!
//! Opening an artifact validates the footer, the header and schema, and the
//! checksum over the index and positions sections, then keeps indexes and
//! positions in memory. Every frame read validates its bounds and checksum.
//! Any failure on a complete artifact is an integrity error.
//!
//! All reads go through the handle that was validated at open time, so the
//! in-memory offsets always describe the file they are applied to, even if
//! the path is replaced afterwards.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::checksum::verify_checksum;
use super::frame::{decode_frame, frame_length, FRAME_OVERHEAD};
use super::index::{IndexSet, IndexTree, LogOffset};
use super::layout::{probe_file, read_header, Footer, Probe};
use crate::errors::{StoreError, StoreResult};
use crate::record::{decode_body, Record};

/// Summary of a full integrity scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Frames decoded
    pub records: u64,
    /// Indexes cross-checked against the log
    pub indexes: usize,
    /// Artifact size in bytes
    pub bytes: u64,
}

/// Metadata about a complete artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub record_count: u64,
    pub size_bytes: u64,
    pub built_at: Option<DateTime<Utc>>,
    pub indexed_fields: Vec<String>,
}

/// Open artifact handle shared by point reads and cursors. Every read
/// seeks first and holds the lock until the frame is read.
#[derive(Clone)]
struct SharedFile(Arc<Mutex<File>>);

impl SharedFile {
    fn new(file: File) -> Self {
        Self(Arc::new(Mutex::new(file)))
    }

    fn lock(&self) -> MutexGuard<'_, File> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Read access to one complete artifact.
pub struct ArtifactReader<R> {
    path: PathBuf,
    file: SharedFile,
    footer: Footer,
    file_len: u64,
    indexes: IndexSet,
    positions: Vec<LogOffset>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> ArtifactReader<R> {
    /// Opens and validates the artifact at `path`.
    ///
    /// A missing file is `NotBuilt`; anything else that is not a complete,
    /// consistent artifact for `R` is an integrity error.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StoreError::not_built(path)),
            Err(e) => return Err(StoreError::integrity_io(path, e)),
        };

        let probed = probe_file(&mut file).map_err(|e| StoreError::integrity_io(path, e))?;
        let (footer, file_len) = match probed {
            Probe::Complete { footer, file_len } => (footer, file_len),
            Probe::Missing => return Err(StoreError::not_built(path)),
            Probe::Invalid(reason) => {
                return Err(StoreError::integrity(format!(
                    "Incomplete or damaged artifact at {}: {}",
                    path.display(),
                    reason
                )))
            }
        };

        let (schema, header_len) =
            read_header(&mut file, file_len).map_err(|e| StoreError::integrity_io(path, e))?;
        if !schema.matches(R::FIELDS) {
            return Err(StoreError::integrity(format!(
                "Artifact schema {:?} does not match record fields {:?}",
                schema.fields,
                R::FIELDS.iter().map(|f| f.name).collect::<Vec<_>>()
            )));
        }
        if header_len != footer.log_start {
            return Err(StoreError::integrity_at_offset(
                header_len,
                format!("Log starts at {}, header ends at {}", footer.log_start, header_len),
            ));
        }

        let sections_len = Footer::start(file_len) - footer.log_end;
        let mut sections = vec![0u8; sections_len as usize];
        file.seek(SeekFrom::Start(footer.log_end))
            .and_then(|_| file.read_exact(&mut sections))
            .map_err(|e| StoreError::integrity_io(path, e))?;
        if !verify_checksum(&sections, footer.sections_crc) {
            return Err(StoreError::integrity_at_offset(
                footer.log_end,
                "Index section checksum mismatch",
            ));
        }

        let split = (footer.positions_offset - footer.log_end) as usize;
        let (index_bytes, position_bytes) = sections.split_at(split);
        let indexes = IndexSet::decode(index_bytes)
            .map_err(|e| StoreError::integrity_at_offset(footer.log_end, e.to_string()))?;
        let positions: Vec<LogOffset> = position_bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                u64::from_le_bytes(buf)
            })
            .collect();

        let reader = Self {
            path: path.to_path_buf(),
            file: SharedFile::new(file),
            footer,
            file_len,
            indexes,
            positions,
            _record: PhantomData,
        };
        for &offset in &reader.positions {
            reader.check_offset(offset)?;
        }
        Ok(reader)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    pub fn record_count(&self) -> u64 {
        self.footer.record_count
    }

    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            path: self.path.clone(),
            record_count: self.footer.record_count,
            size_bytes: self.file_len,
            built_at: self.footer.built_at(),
            indexed_fields: self.indexes.iter().map(|(name, _)| name.to_string()).collect(),
        }
    }

    /// The index over `field`, if the artifact has one.
    pub fn index(&self, field: &str) -> Option<&IndexTree> {
        self.indexes.get(field)
    }

    fn check_offset(&self, offset: LogOffset) -> StoreResult<()> {
        if offset < self.footer.log_start || offset >= self.footer.log_end {
            return Err(StoreError::integrity_at_offset(
                offset,
                format!(
                    "Offset outside log {}..{}",
                    self.footer.log_start, self.footer.log_end
                ),
            ));
        }
        Ok(())
    }

    /// Streams every record in log order.
    pub fn cursor(&self) -> StoreResult<LogCursor<R>> {
        self.cursor_from(0, self.footer.record_count)
    }

    /// Streams up to `limit` records starting at log position `start`.
    pub fn cursor_from(&self, start: u64, limit: u64) -> StoreResult<LogCursor<R>> {
        let start = start.min(self.footer.record_count);
        let limit = limit.min(self.footer.record_count - start);
        let offset = match self.positions.get(start as usize) {
            Some(&offset) => offset,
            None => self.footer.log_end,
        };

        Ok(LogCursor {
            path: self.path.clone(),
            file: self.file.clone(),
            offset,
            log_end: self.footer.log_end,
            remaining: limit,
            failed: false,
            _record: PhantomData,
        })
    }

    /// Reads the record at log position `position`.
    pub fn read_position(&self, position: u64) -> StoreResult<Option<R>> {
        match self.positions.get(position as usize) {
            Some(&offset) => self.read_at(&mut self.file.lock(), offset).map(Some),
            None => Ok(None),
        }
    }

    fn read_at(&self, file: &mut File, offset: LogOffset) -> StoreResult<R> {
        self.check_offset(offset)?;
        let (record, _) = read_frame(file, &self.path, offset, self.footer.log_end)?;
        Ok(record)
    }

    /// Offsets listed under `value` in the index over `field`.
    pub fn lookup(&self, field: &str, value: &str) -> StoreResult<&[LogOffset]> {
        self.indexes
            .get(field)
            .map(|tree| tree.lookup_eq(value))
            .ok_or_else(|| StoreError::unknown_index(field))
    }

    /// Reads records at `offsets`, checking each carries `value` in `field`.
    pub fn read_indexed(&self, field: &str, value: &str, offsets: &[LogOffset]) -> StoreResult<Vec<R>> {
        if offsets.is_empty() {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        let mut records = Vec::with_capacity(offsets.len());
        for &offset in offsets {
            let record = self.read_at(&mut file, offset)?;
            if record.key(field).as_deref() != Some(value) {
                return Err(StoreError::integrity_at_offset(
                    offset,
                    format!("Index '{}' entry '{}' points at a different record", field, value),
                ));
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Reads records at arbitrary log offsets, in the order given.
    pub fn read_offsets(&self, offsets: &[LogOffset]) -> StoreResult<Vec<R>> {
        let mut file = self.file.lock();
        offsets
            .iter()
            .map(|&offset| self.read_at(&mut file, offset))
            .collect()
    }

    /// Full integrity scan.
    ///
    /// Checks every frame, that the log holds exactly `record_count` frames
    /// at the recorded positions, and that each index lists every record
    /// under its own value and nothing else.
    pub fn verify(&self) -> StoreResult<VerifyReport> {
        let mut cursor = self.cursor()?;
        let mut position = 0usize;

        while let Some((offset, record)) = cursor.next_with_offset()? {
            if self.positions.get(position) != Some(&offset) {
                return Err(StoreError::integrity_at_offset(
                    offset,
                    format!("Positions table disagrees with log at record {}", position),
                ));
            }
            for (field, tree) in self.indexes.iter() {
                let key = record.key(field).ok_or_else(|| {
                    StoreError::integrity(format!("Index over undeclared field '{}'", field))
                })?;
                if !tree.contains(&key, offset) {
                    return Err(StoreError::integrity_at_offset(
                        offset,
                        format!("Record missing from index '{}' under '{}'", field, key),
                    ));
                }
            }
            position += 1;
        }

        if cursor.offset != self.footer.log_end {
            return Err(StoreError::integrity_at_offset(
                cursor.offset,
                "Log has frames beyond the recorded count",
            ));
        }
        if position as u64 != self.footer.record_count {
            return Err(StoreError::integrity(format!(
                "Footer claims {} records, log holds {}",
                self.footer.record_count, position
            )));
        }
        for (field, tree) in self.indexes.iter() {
            if tree.offset_count() != self.footer.record_count {
                return Err(StoreError::integrity(format!(
                    "Index '{}' lists {} offsets for {} records",
                    field,
                    tree.offset_count(),
                    self.footer.record_count
                )));
            }
        }

        Ok(VerifyReport {
            records: position as u64,
            indexes: self.indexes.len(),
            bytes: self.file_len,
        })
    }
}

/// Reads the frame at `offset`.
///
/// Returns the record and the frame length.
fn read_frame<R: Record>(
    handle: &mut File,
    path: &Path,
    offset: u64,
    log_end: u64,
) -> StoreResult<(R, u64)> {
    let remaining = log_end.saturating_sub(offset);
    if remaining < FRAME_OVERHEAD as u64 {
        return Err(StoreError::integrity_at_offset(
            offset,
            format!("Truncated log: {} bytes remaining", remaining),
        ));
    }

    handle
        .seek(SeekFrom::Start(offset))
        .map_err(|e| StoreError::integrity_io(path, e))?;
    let mut prefix = [0u8; 4];
    handle
        .read_exact(&mut prefix)
        .map_err(|e| StoreError::integrity_io(path, e))?;
    let length = frame_length(prefix) as u64;
    if length < FRAME_OVERHEAD as u64 || length > remaining {
        return Err(StoreError::integrity_at_offset(
            offset,
            format!("Invalid frame length {} ({} bytes left in log)", length, remaining),
        ));
    }

    let mut frame = vec![0u8; length as usize];
    frame[..4].copy_from_slice(&prefix);
    handle
        .read_exact(&mut frame[4..])
        .map_err(|e| StoreError::integrity_io(path, e))?;

    let body = decode_frame(&frame).map_err(|e| StoreError::integrity_at_offset(offset, e.to_string()))?;
    let record = decode_body::<R>(&body).map_err(|e| StoreError::integrity_codec(offset, e))?;
    Ok((record, length))
}

/// Sequential cursor over the log.
///
/// Shares the artifact handle it was created from and tracks its own
/// position. After the first error the cursor yields nothing more.
pub struct LogCursor<R> {
    path: PathBuf,
    file: SharedFile,
    offset: u64,
    log_end: u64,
    remaining: u64,
    failed: bool,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> LogCursor<R> {
    /// Next record together with its log offset.
    pub fn next_with_offset(&mut self) -> StoreResult<Option<(u64, R)>> {
        if self.failed || self.remaining == 0 {
            return Ok(None);
        }

        let read = read_frame::<R>(&mut self.file.lock(), &self.path, self.offset, self.log_end);
        match read {
            Ok((record, length)) => {
                let offset = self.offset;
                self.offset += length;
                self.remaining -= 1;
                Ok(Some((offset, record)))
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    /// Records left to read
    pub fn remaining(&self) -> u64 {
        if self.failed {
            0
        } else {
            self.remaining
        }
    }
}

impl<R: Record> Iterator for LogCursor<R> {
    type Item = StoreResult<R>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_with_offset()
            .map(|next| next.map(|(_, record)| record))
            .transpose()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining() as usize;
        (0, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::index::IndexSpec;
    use crate::artifact::writer::ArtifactWriter;
    use crate::errors::StoreErrorCode;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    crate::define_record! {
        struct Doc {
            doc_id: String,
            venue: String,
        }
    }

    crate::define_record! {
        struct OtherShape {
            doc_id: String,
        }
    }

    fn doc(id: &str, venue: &str) -> Doc {
        Doc {
            doc_id: id.to_string(),
            venue: venue.to_string(),
        }
    }

    fn build(path: &Path, docs: &[Doc]) -> Vec<u64> {
        let specs = [IndexSpec::unique("doc_id"), IndexSpec::multi("venue")];
        let mut writer = ArtifactWriter::<Doc>::create(path, &specs, 3).unwrap();
        let offsets = docs.iter().map(|d| writer.append(d).unwrap()).collect();
        writer.finish().unwrap();
        offsets
    }

    fn sample() -> Vec<Doc> {
        vec![
            doc("d1", "arXiv"),
            doc("d2", "PhilPapers"),
            doc("d3", "arXiv"),
        ]
    }

    #[test]
    fn test_cursor_reads_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docs.irs");
        build(&path, &sample());

        let reader = ArtifactReader::<Doc>::open(&path).unwrap();
        assert_eq!(reader.record_count(), 3);
        let records: Vec<Doc> = reader.cursor().unwrap().map(Result::unwrap).collect();
        assert_eq!(records, sample());
    }

    #[test]
    fn test_cursor_from_position() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docs.irs");
        build(&path, &sample());

        let reader = ArtifactReader::<Doc>::open(&path).unwrap();
        let records: Vec<Doc> = reader.cursor_from(1, 1).unwrap().map(Result::unwrap).collect();
        assert_eq!(records, vec![doc("d2", "PhilPapers")]);
        assert_eq!(reader.cursor_from(5, 10).unwrap().count(), 0);
    }

    #[test]
    fn test_lookup_and_read_indexed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docs.irs");
        let offsets = build(&path, &sample());

        let reader = ArtifactReader::<Doc>::open(&path).unwrap();
        assert_eq!(reader.lookup("venue", "arXiv").unwrap(), &[offsets[0], offsets[2]]);

        let found = reader.read_indexed("doc_id", "d2", reader.lookup("doc_id", "d2").unwrap()).unwrap();
        assert_eq!(found, vec![doc("d2", "PhilPapers")]);

        let err = reader.lookup("title", "x").unwrap_err();
        assert_eq!(err.code(), StoreErrorCode::UnknownIndex);
    }

    #[test]
    fn test_read_indexed_detects_wrong_target() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docs.irs");
        let offsets = build(&path, &sample());

        let reader = ArtifactReader::<Doc>::open(&path).unwrap();
        let err = reader.read_indexed("doc_id", "d1", &[offsets[1]]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_verify_clean_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docs.irs");
        build(&path, &sample());

        let report = ArtifactReader::<Doc>::open(&path).unwrap().verify().unwrap();
        assert_eq!(report.records, 3);
        assert_eq!(report.indexes, 2);
    }

    #[test]
    fn test_corrupt_frame_detected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docs.irs");
        let offsets = build(&path, &sample());

        {
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(offsets[1] + 9)).unwrap();
            file.write_all(&[0xFF, 0xFF]).unwrap();
        }

        let reader = ArtifactReader::<Doc>::open(&path).unwrap();
        let results: Vec<_> = reader.cursor().unwrap().collect();
        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert_eq!(err.code(), StoreErrorCode::Integrity);
        assert_eq!(results.len(), 2);

        assert!(reader.verify().is_err());
    }

    #[test]
    fn test_corrupt_index_section_detected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docs.irs");
        build(&path, &sample());

        let log_end = ArtifactReader::<Doc>::open(&path).unwrap().footer().log_end;
        {
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(log_end + 6)).unwrap();
            file.write_all(&[0x5A]).unwrap();
        }

        let err = ArtifactReader::<Doc>::open(&path).err().unwrap();
        assert_eq!(err.code(), StoreErrorCode::Integrity);
        assert!(err.to_string().contains("Index section checksum mismatch"));
    }

    #[test]
    fn test_schema_mismatch_detected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docs.irs");
        build(&path, &sample());

        let err = ArtifactReader::<OtherShape>::open(&path).err().unwrap();
        assert_eq!(err.code(), StoreErrorCode::Integrity);
        assert!(err.to_string().contains("schema"));
    }

    #[test]
    fn test_truncated_artifact_is_integrity_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docs.irs");
        build(&path, &sample());

        let len = std::fs::metadata(&path).unwrap().len();
        OpenOptions::new().write(true).open(&path).unwrap().set_len(len - 10).unwrap();

        let err = ArtifactReader::<Doc>::open(&path).err().unwrap();
        assert_eq!(err.code(), StoreErrorCode::Integrity);
    }

    #[test]
    fn test_missing_artifact_is_not_built() {
        let temp_dir = TempDir::new().unwrap();
        let err = ArtifactReader::<Doc>::open(&temp_dir.path().join("none.irs")).err().unwrap();
        assert_eq!(err.code(), StoreErrorCode::NotBuilt);
    }

    #[test]
    fn test_interleaved_cursors_keep_their_own_position() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docs.irs");
        build(&path, &sample());

        let reader = ArtifactReader::<Doc>::open(&path).unwrap();
        let mut first = reader.cursor().unwrap();
        let mut second = reader.cursor_from(1, 2).unwrap();

        assert_eq!(first.next().unwrap().unwrap(), doc("d1", "arXiv"));
        assert_eq!(second.next().unwrap().unwrap(), doc("d2", "PhilPapers"));
        assert_eq!(reader.read_position(2).unwrap(), Some(doc("d3", "arXiv")));
        assert_eq!(first.next().unwrap().unwrap(), doc("d2", "PhilPapers"));
        assert_eq!(second.next().unwrap().unwrap(), doc("d3", "arXiv"));
        assert_eq!(first.next().unwrap().unwrap(), doc("d3", "arXiv"));
        assert!(first.next().is_none());
        assert!(second.next().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_reads_stay_on_opened_artifact_after_replace() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docs.irs");
        build(&path, &sample());
        let reader = ArtifactReader::<Doc>::open(&path).unwrap();

        let replacement = temp_dir.path().join("other.irs");
        build(
            &replacement,
            &[doc("x-long-identifier-1", "Elsewhere"), doc("x2", "Elsewhere")],
        );
        std::fs::rename(&replacement, &path).unwrap();

        let records: Vec<Doc> = reader.cursor().unwrap().map(Result::unwrap).collect();
        assert_eq!(records, sample());
        let offsets = reader.lookup("doc_id", "d2").unwrap();
        assert_eq!(
            reader.read_indexed("doc_id", "d2", offsets).unwrap(),
            vec![doc("d2", "PhilPapers")]
        );
        assert_eq!(reader.verify().unwrap().records, 3);
    }
}
