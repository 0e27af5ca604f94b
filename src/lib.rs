//! irstore - lazy, cached, randomly accessible record stores for IR test collections
//!
//! A store drains an expensive one-pass producer exactly once into a
//! compressed, checksummed artifact on disk, then serves repeated scans and
//! keyed lookups from it.

pub mod artifact;
pub mod collection;
pub mod crash_point;
pub mod errors;
pub mod observability;
pub mod record;
pub mod store;

pub use errors::{ProducerError, StoreError, StoreErrorCode, StoreResult};
pub use record::{FieldDef, FieldKind, Record};
pub use store::{
    CountHints, Lookup, Producer, RecordIter, Store, StoreConfig, StoreSettings, StoreState,
};
