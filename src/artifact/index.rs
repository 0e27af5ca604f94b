//! Field indexes
//!
//! Each declared index maps a field value to the ascending list of log
//! offsets of the records carrying it. Indexes are built in memory while the
//! log is written and persisted after it as one section:
//!
//! ```text
//! u32 index_count
//! per index : u16 name_len | name | u8 unique | u64 entry_count | entry*
//! entry     : u32 key_len | key | u32 offset_count | offset_count × u64
//! ```
//!
//! Indexes are stored sorted by field name and entries sorted by key, so the
//! section bytes are deterministic for a given log.

use std::collections::BTreeMap;
use std::io;

use super::layout::SectionReader;

/// Log offset type
pub type LogOffset = u64;

/// Declares an index over one record field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub field: String,
    pub unique: bool,
}

impl IndexSpec {
    /// Index whose values identify at most one record
    pub fn unique(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            unique: true,
        }
    }

    /// Index whose values may repeat
    pub fn multi(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            unique: false,
        }
    }
}

/// A single field index using BTreeMap for deterministic ordering.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexTree {
    unique: bool,
    tree: BTreeMap<String, Vec<LogOffset>>,
}

impl IndexTree {
    pub fn new(unique: bool) -> Self {
        Self {
            unique,
            tree: BTreeMap::new(),
        }
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Insert an offset for a key, keeping offsets ascending.
    ///
    /// Returns false, leaving the tree unchanged, when the index is unique
    /// and the key already maps to a different offset.
    pub fn insert(&mut self, key: &str, offset: LogOffset) -> bool {
        if let Some(offsets) = self.tree.get_mut(key) {
            if self.unique && !offsets.contains(&offset) {
                return false;
            }
            if let Err(pos) = offsets.binary_search(&offset) {
                offsets.insert(pos, offset);
            }
            return true;
        }
        self.tree.insert(key.to_string(), vec![offset]);
        true
    }

    /// All offsets for an exact key match, ascending.
    pub fn lookup_eq(&self, key: &str) -> &[LogOffset] {
        self.tree.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `offset` is listed under `key`.
    pub fn contains(&self, key: &str, offset: LogOffset) -> bool {
        self.lookup_eq(key).binary_search(&offset).is_ok()
    }

    /// Number of offsets across all keys
    pub fn offset_count(&self) -> u64 {
        self.tree.values().map(|v| v.len() as u64).sum()
    }

    fn encode_into(&self, name: &str, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.push(u8::from(self.unique));
        buf.extend_from_slice(&(self.tree.len() as u64).to_le_bytes());
        for (key, offsets) in &self.tree {
            buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
            buf.extend_from_slice(key.as_bytes());
            buf.extend_from_slice(&(offsets.len() as u32).to_le_bytes());
            for offset in offsets {
                buf.extend_from_slice(&offset.to_le_bytes());
            }
        }
    }
}

/// All declared indexes of one artifact, keyed by field name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexSet {
    indexes: BTreeMap<String, IndexTree>,
}

impl IndexSet {
    pub fn from_specs(specs: &[IndexSpec]) -> Self {
        let indexes = specs
            .iter()
            .map(|spec| (spec.field.clone(), IndexTree::new(spec.unique)))
            .collect();
        Self { indexes }
    }

    pub fn get(&self, field: &str) -> Option<&IndexTree> {
        self.indexes.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexTree)> {
        self.indexes.iter().map(|(name, tree)| (name.as_str(), tree))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut IndexTree)> {
        self.indexes
            .iter_mut()
            .map(|(name, tree)| (name.as_str(), tree))
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Serializes the index section.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.indexes.len() as u32).to_le_bytes());
        for (name, tree) in &self.indexes {
            tree.encode_into(name, &mut buf);
        }
        buf
    }

    /// Parses an index section, rejecting unsorted or trailing data.
    pub fn decode(data: &[u8]) -> io::Result<Self> {
        let mut section = SectionReader::new(data);
        let count = section.u32()?;
        let mut indexes = BTreeMap::new();

        for _ in 0..count {
            let name_len = section.u16()? as usize;
            let name = section.string(name_len)?;
            let unique = section.u8()? != 0;
            let entries = section.u64()?;

            let mut tree = BTreeMap::new();
            for _ in 0..entries {
                let key_len = section.u32()? as usize;
                let key = section.string(key_len)?;
                let offset_count = section.u32()? as usize;
                if unique && offset_count != 1 {
                    return Err(invalid(format!(
                        "Unique index '{}' has {} offsets for one key",
                        name, offset_count
                    )));
                }
                if offset_count.saturating_mul(8) > section.remaining() {
                    return Err(invalid(format!(
                        "Index '{}' offset list exceeds section",
                        name
                    )));
                }

                let mut offsets = Vec::with_capacity(offset_count);
                for _ in 0..offset_count {
                    offsets.push(section.u64()?);
                }
                if offsets.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(invalid(format!(
                        "Index '{}' offsets not ascending for key '{}'",
                        name, key
                    )));
                }
                tree.insert(key, offsets);
            }
            if tree.len() as u64 != entries {
                return Err(invalid(format!("Index '{}' has repeated keys", name)));
            }

            indexes.insert(name, IndexTree { unique, tree });
        }

        if section.remaining() != 0 {
            return Err(invalid("Trailing bytes after index section"));
        }
        if indexes.len() as u32 != count {
            return Err(invalid("Index section lists a field twice"));
        }

        Ok(Self { indexes })
    }
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}
