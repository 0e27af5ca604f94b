//! Artifact header and footer
//!
//! ```text
//! header : magic "IRSTORE1" | u32 schema_len | schema | u32 crc32(header)
//! schema : u16 field_count | per field: u16 name_len | name | u8 kind
//! footer : u64 log_start | u64 log_end | u64 positions_offset |
//!          u64 record_count | i64 built_at_millis |
//!          u32 sections_crc | u32 footer_crc | magic "IRSTEND\0"
//! ```
//!
//! The footer is fixed-size and sits at the very end of the file, so a
//! completeness probe reads only its last 56 bytes. `sections_crc` covers the
//! index section and the positions table (bytes `log_end..footer_start`).
//! `footer_crc` covers the footer fields before it.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};

use super::checksum::compute_checksum;
use crate::record::{FieldDef, FieldKind};

pub const HEADER_MAGIC: &[u8; 8] = b"IRSTORE1";
pub const FOOTER_MAGIC: &[u8; 8] = b"IRSTEND\0";
pub const FOOTER_LEN: u64 = 8 * 5 + 4 + 4 + 8;

/// Bounds-checked little-endian reader over an in-memory section.
pub struct SectionReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SectionReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn bytes(&mut self, n: usize) -> io::Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| invalid(format!("Section truncated at byte {}", self.pos)))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn u8(&mut self) -> io::Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> io::Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> io::Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.bytes(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn string(&mut self, len: usize) -> io::Result<String> {
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| invalid("Invalid UTF-8 in section"))
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// Encodes the header for a record shape.
pub fn encode_header(fields: &[FieldDef]) -> Vec<u8> {
    let mut schema = Vec::new();
    schema.extend_from_slice(&(fields.len() as u16).to_le_bytes());
    for field in fields {
        schema.extend_from_slice(&(field.name.len() as u16).to_le_bytes());
        schema.extend_from_slice(field.name.as_bytes());
        schema.push(field.kind.tag());
    }

    let mut header = Vec::with_capacity(8 + 4 + schema.len() + 4);
    header.extend_from_slice(HEADER_MAGIC);
    header.extend_from_slice(&(schema.len() as u32).to_le_bytes());
    header.extend_from_slice(&schema);
    let checksum = compute_checksum(&header);
    header.extend_from_slice(&checksum.to_le_bytes());
    header
}

/// Schema stored in an artifact header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSchema {
    pub fields: Vec<(String, FieldKind)>,
}

impl StoredSchema {
    /// Whether the stored schema is exactly `fields`, in order.
    pub fn matches(&self, fields: &[FieldDef]) -> bool {
        self.fields.len() == fields.len()
            && self
                .fields
                .iter()
                .zip(fields)
                .all(|((name, kind), def)| name == def.name && *kind == def.kind)
    }
}

/// Reads and verifies the header at the start of `file`.
///
/// Returns the stored schema and the header length, which is where the log
/// starts.
pub fn read_header(file: &mut File, file_len: u64) -> io::Result<(StoredSchema, u64)> {
    file.seek(SeekFrom::Start(0))?;

    let mut prefix = [0u8; 12];
    file.read_exact(&mut prefix)?;
    if &prefix[..8] != HEADER_MAGIC {
        return Err(invalid("Bad header magic"));
    }

    let schema_len = u32::from_le_bytes([prefix[8], prefix[9], prefix[10], prefix[11]]) as u64;
    let header_len = 12 + schema_len + 4;
    if header_len > file_len {
        return Err(invalid(format!(
            "Schema length {} exceeds file size {}",
            schema_len, file_len
        )));
    }

    let mut rest = vec![0u8; (schema_len + 4) as usize];
    file.read_exact(&mut rest)?;
    let (schema_bytes, checksum_bytes) = rest.split_at(schema_len as usize);

    let stored = u32::from_le_bytes([
        checksum_bytes[0],
        checksum_bytes[1],
        checksum_bytes[2],
        checksum_bytes[3],
    ]);
    let computed = super::checksum::compute_checksum_parts(&[&prefix, schema_bytes]);
    if computed != stored {
        return Err(invalid(format!(
            "Header checksum mismatch: computed {:08x}, stored {:08x}",
            computed, stored
        )));
    }

    let mut section = SectionReader::new(schema_bytes);
    let count = section.u16()? as usize;
    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        let name_len = section.u16()? as usize;
        let name = section.string(name_len)?;
        let tag = section.u8()?;
        let kind = FieldKind::from_tag(tag)
            .ok_or_else(|| invalid(format!("Unknown field kind tag {}", tag)))?;
        fields.push((name, kind));
    }
    if section.remaining() != 0 {
        return Err(invalid("Trailing bytes in schema"));
    }

    Ok((StoredSchema { fields }, header_len))
}

/// Fixed-size trailer written as the last step of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// Offset of the first frame
    pub log_start: u64,
    /// Offset one past the last frame; the index section starts here
    pub log_end: u64,
    /// Offset of the positions table
    pub positions_offset: u64,
    /// Number of frames in the log
    pub record_count: u64,
    /// Build completion time, milliseconds since the Unix epoch
    pub built_at_millis: i64,
    /// CRC32 over the index section and positions table
    pub sections_crc: u32,
}

impl Footer {
    fn fields_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(44);
        buf.extend_from_slice(&self.log_start.to_le_bytes());
        buf.extend_from_slice(&self.log_end.to_le_bytes());
        buf.extend_from_slice(&self.positions_offset.to_le_bytes());
        buf.extend_from_slice(&self.record_count.to_le_bytes());
        buf.extend_from_slice(&self.built_at_millis.to_le_bytes());
        buf.extend_from_slice(&self.sections_crc.to_le_bytes());
        buf
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.fields_bytes();
        let checksum = compute_checksum(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf.extend_from_slice(FOOTER_MAGIC);
        buf
    }

    /// Parses a footer and checks it against the file length.
    pub fn decode(data: &[u8], file_len: u64) -> Result<Self, String> {
        if data.len() as u64 != FOOTER_LEN {
            return Err(format!("Footer must be {} bytes", FOOTER_LEN));
        }
        if &data[48..56] != FOOTER_MAGIC {
            return Err("Bad footer magic".to_string());
        }

        let mut section = SectionReader::new(data);
        let field_err = |e: io::Error| e.to_string();
        let footer = Footer {
            log_start: section.u64().map_err(field_err)?,
            log_end: section.u64().map_err(field_err)?,
            positions_offset: section.u64().map_err(field_err)?,
            record_count: section.u64().map_err(field_err)?,
            built_at_millis: section.u64().map_err(field_err)? as i64,
            sections_crc: section.u32().map_err(field_err)?,
        };
        let stored = section.u32().map_err(field_err)?;
        let computed = compute_checksum(&data[..44]);
        if computed != stored {
            return Err(format!(
                "Footer checksum mismatch: computed {:08x}, stored {:08x}",
                computed, stored
            ));
        }

        footer.check_bounds(file_len)?;
        Ok(footer)
    }

    fn check_bounds(&self, file_len: u64) -> Result<(), String> {
        let footer_start = file_len
            .checked_sub(FOOTER_LEN)
            .ok_or_else(|| "File shorter than footer".to_string())?;
        let ordered = self.log_start <= self.log_end
            && self.log_end <= self.positions_offset
            && self.positions_offset <= footer_start;
        if !ordered {
            return Err(format!(
                "Section offsets out of order: log {}..{}, positions {}, footer {}",
                self.log_start, self.log_end, self.positions_offset, footer_start
            ));
        }

        let positions_len = self
            .record_count
            .checked_mul(8)
            .ok_or_else(|| "Record count overflow".to_string())?;
        let positions_end = self
            .positions_offset
            .checked_add(positions_len)
            .ok_or_else(|| "Positions table extends past the addressable range".to_string())?;
        if positions_end != footer_start {
            return Err(format!(
                "Positions table size mismatch: {} records, {} bytes available",
                self.record_count,
                footer_start - self.positions_offset
            ));
        }
        Ok(())
    }

    /// Byte offset where the footer begins, given the file length.
    pub fn start(file_len: u64) -> u64 {
        file_len.saturating_sub(FOOTER_LEN)
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.built_at_millis).single()
    }
}

/// Outcome of a cheap completeness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Nothing at the artifact path
    Missing,
    /// A file exists but its footer does not describe a complete artifact
    Invalid(String),
    /// Complete artifact
    Complete { footer: Footer, file_len: u64 },
}

/// Reads only the footer of the file at `path`.
pub fn probe(path: &Path) -> io::Result<Probe> {
    match File::open(path) {
        Ok(mut file) => probe_file(&mut file),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Probe::Missing),
        Err(e) => Err(e),
    }
}

/// Reads only the footer of an already opened artifact.
pub fn probe_file(file: &mut File) -> io::Result<Probe> {
    let file_len = file.metadata()?.len();
    if file_len < FOOTER_LEN {
        return Ok(Probe::Invalid(format!(
            "File is {} bytes, shorter than the footer",
            file_len
        )));
    }

    let mut buf = vec![0u8; FOOTER_LEN as usize];
    file.seek(SeekFrom::Start(Footer::start(file_len)))?;
    file.read_exact(&mut buf)?;

    Ok(match Footer::decode(&buf, file_len) {
        Ok(footer) => Probe::Complete { footer, file_len },
        Err(reason) => Probe::Invalid(reason),
    })
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const FIELDS: &[FieldDef] = &[
        FieldDef {
            name: "doc_id",
            kind: FieldKind::Str,
        },
        FieldDef {
            name: "rank",
            kind: FieldKind::Int,
        },
    ];

    fn footer(record_count: u64) -> Footer {
        Footer {
            log_start: 40,
            log_end: 100,
            positions_offset: 120,
            record_count,
            built_at_millis: 1_760_000_000_000,
            sections_crc: 0xdead_beef,
        }
    }

    #[test]
    fn test_footer_length() {
        assert_eq!(footer(2).encode().len() as u64, FOOTER_LEN);
    }

    #[test]
    fn test_footer_decode() {
        let encoded = footer(2).encode();
        let file_len = 120 + 16 + FOOTER_LEN;
        assert_eq!(Footer::decode(&encoded, file_len), Ok(footer(2)));
        assert!(footer(2).built_at().is_some());
    }

    #[test]
    fn test_footer_rejects_wrong_positions_size() {
        let encoded = footer(3).encode();
        let err = Footer::decode(&encoded, 120 + 16 + FOOTER_LEN).unwrap_err();
        assert!(err.contains("Positions table size mismatch"));
    }

    #[test]
    fn test_footer_with_huge_record_count_is_invalid() {
        let forged = footer(u64::MAX / 8);
        let encoded = forged.encode();
        let err = Footer::decode(&encoded, 120 + 16 + FOOTER_LEN).unwrap_err();
        assert!(err.contains("addressable range"));

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docs.irs");
        let mut bytes = vec![0u8; 136];
        bytes.extend_from_slice(&encoded);
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(probe(&path).unwrap(), Probe::Invalid(_)));
    }

    #[test]
    fn test_footer_checksum() {
        let mut encoded = footer(2).encode();
        encoded[3] ^= 0x01;
        let err = Footer::decode(&encoded, 120 + 16 + FOOTER_LEN).unwrap_err();
        assert!(err.contains("Footer checksum mismatch"));
    }

    #[test]
    fn test_header_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("header.irs");
        let header = encode_header(FIELDS);
        File::create(&path).unwrap().write_all(&header).unwrap();

        let mut file = File::open(&path).unwrap();
        let (schema, len) = read_header(&mut file, header.len() as u64).unwrap();
        assert_eq!(len, header.len() as u64);
        assert!(schema.matches(FIELDS));
        assert!(!schema.matches(&FIELDS[..1]));
    }

    #[test]
    fn test_probe_missing_and_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docs.irs");
        assert_eq!(probe(&path).unwrap(), Probe::Missing);

        std::fs::write(&path, b"not an artifact").unwrap();
        assert!(matches!(probe(&path).unwrap(), Probe::Invalid(_)));
    }
}
