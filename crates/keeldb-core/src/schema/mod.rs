mod engine;
mod record;

pub(crate) use engine::SchemaEngine;
pub use record::{CollectionRecord, IndexRecord, RecordError, SCHEMA_VERSION, SchemaRecord};

use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};

impl From<RecordError> for Error {
    fn from(err: RecordError) -> Self {
        Self::new(ErrorKind::Backend, err.to_string())
    }
}

///
/// Statistics
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Statistics {
    /// Collections present in the schema (removed ones excluded).
    pub collections_count: u64,
    /// Collections retired by a migration and awaiting an explicit purge.
    pub removed_collections_count: u64,
    pub indexes_count: u64,
    pub store: StoreStatistics,
}

///
/// StoreStatistics
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StoreStatistics {
    /// Key/value pairs under the store prefix, schema record included.
    pub pairs_count: u64,
}
