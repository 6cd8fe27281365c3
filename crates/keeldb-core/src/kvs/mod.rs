//! The external key-value store contract.
//!
//! The document layer assumes an ordered, transactional KVS addressed by
//! composite tuple keys. The one hard requirement is the ordering contract:
//! entries must be ordered element-wise by [`TupleKey`]'s `Ord` (strings
//! lexicographically, numbers numerically, a total order between types), so
//! that range scans over a tuple prefix implement ordered queries.

mod memory;

pub use memory::MemoryKvs;

use crate::{
    error::Error,
    key::TupleKey,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error as ThisError;

///
/// KvsError
/// (backend boundary)
///

#[derive(Clone, Debug, ThisError)]
pub enum KvsError {
    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    #[error("key already exists: {key}")]
    KeyExists { key: String },

    #[error("transaction already completed")]
    TransactionCompleted,

    #[error("transactions do not nest")]
    NestedTransaction,

    #[error("{message}")]
    Backend { message: String },
}

///
/// ReadOptions
///

#[derive(Clone, Copy, Debug, Default)]
pub struct ReadOptions {
    pub error_if_missing: bool,
}

///
/// WriteOptions
///

#[derive(Clone, Copy, Debug)]
pub struct WriteOptions {
    pub create_if_missing: bool,
    pub error_if_exists: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
        }
    }
}

impl WriteOptions {
    /// Create-only write: fail when the key is already present.
    #[must_use]
    pub const fn create() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: true,
        }
    }
}

///
/// RemoveOptions
///

#[derive(Clone, Copy, Debug, Default)]
pub struct RemoveOptions {
    pub error_if_missing: bool,
}

///
/// ScanOptions
///
/// Range description. `start`/`start_after` and `end`/`end_before` are
/// inclusive/exclusive cursor tuples in the key space *below* `prefix`;
/// a cursor that is itself a prefix covers its whole extension run.
///

#[derive(Clone, Debug)]
pub struct ScanOptions {
    pub prefix: Option<TupleKey>,
    pub start: Option<TupleKey>,
    pub start_after: Option<TupleKey>,
    pub end: Option<TupleKey>,
    pub end_before: Option<TupleKey>,
    pub reverse: bool,
    pub limit: Option<usize>,
    pub return_values: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            start: None,
            start_after: None,
            end: None,
            end_before: None,
            reverse: false,
            limit: None,
            return_values: true,
        }
    }
}

impl ScanOptions {
    #[must_use]
    pub fn prefix(prefix: TupleKey) -> Self {
        Self {
            prefix: Some(prefix),
            ..Self::default()
        }
    }
}

///
/// ScanEntry
///

#[derive(Clone, Debug)]
pub struct ScanEntry {
    pub key: TupleKey,
    pub value: Option<Value>,
}

///
/// KeyValueStore
///
/// Operation set shared by a store handle and a transaction handle.
///

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Point read. `None` when absent, unless `error_if_missing`.
    async fn get(&self, key: &TupleKey, opts: ReadOptions) -> Result<Option<Value>, KvsError>;

    /// Point write with create/update flags.
    async fn put(&self, key: &TupleKey, value: Value, opts: WriteOptions) -> Result<(), KvsError>;

    /// Point delete; returns whether a pair was removed.
    async fn delete(&self, key: &TupleKey, opts: RemoveOptions) -> Result<bool, KvsError>;

    /// Ordered vector point read preserving input order.
    async fn get_many(
        &self,
        keys: &[TupleKey],
        opts: ReadOptions,
    ) -> Result<Vec<Option<Value>>, KvsError>;

    /// Ordered range scan.
    async fn find(&self, opts: ScanOptions) -> Result<Vec<ScanEntry>, KvsError>;

    /// Count of the same range.
    async fn count(&self, opts: ScanOptions) -> Result<u64, KvsError>;

    /// Bulk delete over a range; returns the number of removed pairs.
    async fn find_and_delete(&self, opts: ScanOptions) -> Result<u64, KvsError>;

    /// Open a scoped ACID unit. Writes stage inside the handle and become
    /// visible atomically on commit.
    async fn begin(&self) -> Result<Arc<dyn KvsTransaction>, KvsError>;

    /// Release resources.
    async fn close(&self) -> Result<(), KvsError>;
}

///
/// KvsTransaction
///

#[async_trait]
pub trait KvsTransaction: KeyValueStore {
    async fn commit(&self) -> Result<(), KvsError>;

    async fn rollback(&self) -> Result<(), KvsError>;

    /// The same handle viewed as the plain operation set.
    fn as_kvs(&self) -> &dyn KeyValueStore;
}

/// Resolve a backend from a URL. Only the built-in `memory:` scheme is
/// recognised here; applications wiring a real backend construct it
/// themselves and hand the trait object to the store.
pub async fn connect(url: &str) -> Result<Arc<dyn KeyValueStore>, Error> {
    if url == "memory:" || url.starts_with("memory://") {
        return Ok(Arc::new(MemoryKvs::new()));
    }

    Err(Error::config(format!("unsupported key-value store url: {url}")))
}
