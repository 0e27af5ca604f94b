//! Store artifact: the on-disk form of a built store
//!
//! One file holds the record log, the field indexes, a positions table and
//! a fixed-size footer. The artifact is written once under a temporary
//! name and becomes visible only through an atomic rename, so any file at
//! the artifact path is either complete or damaged from outside.
//!
//! # Design Principles
//!
//! - Written once, never modified in place
//! - Checksum-verified on every read
//! - Producer order preserved in the log
//! - Every record reachable from every declared index

mod checksum;
mod frame;
mod index;
mod layout;
mod reader;
mod writer;

pub use index::{IndexSet, IndexSpec, IndexTree, LogOffset};
pub use layout::{probe, Footer, Probe};
pub use reader::{ArtifactInfo, ArtifactReader, LogCursor, VerifyReport};
pub use writer::ArtifactWriter;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Where a build writes before publishing: `<path>.tmp`
pub fn temp_path(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}

/// Advisory lock file guarding builds of `path`: `<path>.lock`
pub fn lock_path(path: &Path) -> PathBuf {
    with_suffix(path, ".lock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_paths() {
        let path = Path::new("/data/isearch/docs.irs");
        assert_eq!(temp_path(path), PathBuf::from("/data/isearch/docs.irs.tmp"));
        assert_eq!(lock_path(path), PathBuf::from("/data/isearch/docs.irs.lock"));
    }
}
