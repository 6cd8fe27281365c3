use crate::model::{CollectionModel, IndexModel};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::Not;
use thiserror::Error as ThisError;

/// Version written by this code. Gates every layout change of the persisted
/// key forms and of the record itself.
pub const SCHEMA_VERSION: u32 = 3;

///
/// RecordError
/// (serialize boundary)
///

#[derive(Debug, ThisError)]
pub enum RecordError {
    #[error("schema record failed to decode: {0}")]
    Decode(String),

    #[error("schema record failed to encode: {0}")]
    Encode(String),
}

///
/// SchemaRecord
///
/// The single persisted entry at `[store_name]`: declared collections and
/// index metadata, the schema version, and the cross-process lock bit.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SchemaRecord {
    pub name: String,
    pub version: u32,

    #[serde(default, skip_serializing_if = "Not::not")]
    pub is_locked: bool,

    pub collections: Vec<CollectionRecord>,
}

impl SchemaRecord {
    /// Record for a freshly created store.
    #[must_use]
    pub fn from_models(name: &str, collections: &[CollectionModel]) -> Self {
        Self {
            name: name.to_owned(),
            version: SCHEMA_VERSION,
            is_locked: false,
            collections: collections
                .iter()
                .map(|c| CollectionRecord {
                    name: c.name().to_owned(),
                    has_been_removed: false,
                    indexes: c.indexes().iter().map(IndexRecord::from_model).collect(),
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&CollectionRecord> {
        self.collections.iter().find(|c| c.name == name)
    }

    pub fn collection_mut(&mut self, name: &str) -> Option<&mut CollectionRecord> {
        self.collections.iter_mut().find(|c| c.name == name)
    }

    pub fn decode(value: &Value) -> Result<Self, RecordError> {
        serde_json::from_value(value.clone()).map_err(|err| RecordError::Decode(err.to_string()))
    }

    pub fn encode(&self) -> Result<Value, RecordError> {
        serde_json::to_value(self).map_err(|err| RecordError::Encode(err.to_string()))
    }
}

///
/// CollectionRecord
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CollectionRecord {
    pub name: String,

    #[serde(default, skip_serializing_if = "Not::not")]
    pub has_been_removed: bool,

    #[serde(default)]
    pub indexes: Vec<IndexRecord>,
}

impl CollectionRecord {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            has_been_removed: false,
            indexes: Vec::new(),
        }
    }

    #[must_use]
    pub fn index(&self, keys: &[String]) -> Option<&IndexRecord> {
        self.indexes.iter().find(|i| i.keys == keys)
    }

    pub fn index_mut(&mut self, keys: &[String]) -> Option<&mut IndexRecord> {
        self.indexes.iter_mut().find(|i| i.keys == keys)
    }
}

///
/// IndexRecord
///
/// Persisted identity and migration metadata of one index. The build
/// flags survive a crash mid-rebuild so the next initialisation can
/// resume: `is_creating` marks a backfill in flight, `is_deleting` a
/// range removal in flight.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct IndexRecord {
    pub keys: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    #[serde(default, skip_serializing_if = "Not::not")]
    pub is_creating: bool,

    #[serde(default, skip_serializing_if = "Not::not")]
    pub is_deleting: bool,
}

impl IndexRecord {
    #[must_use]
    pub fn from_model(index: &IndexModel) -> Self {
        Self {
            keys: index.keys().to_vec(),
            projection: index.projection().map(<[String]>::to_vec),
            version: index.version(),
            is_creating: false,
            is_deleting: false,
        }
    }

    /// KVS name segment, as used in index entry keys.
    #[must_use]
    pub fn name(&self) -> String {
        self.keys.join("+")
    }

    /// True when the persisted metadata no longer matches the declaration
    /// and the index must be rebuilt.
    #[must_use]
    pub fn differs_from(&self, index: &IndexModel) -> bool {
        self.projection.as_deref() != index.projection() || self.version != index.version()
    }
}

///
/// TESTS
///
