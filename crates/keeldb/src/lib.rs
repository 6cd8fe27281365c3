//! Collections of JSON documents with secondary indexes, range queries,
//! and schema migration, layered on a transactional ordered key-value
//! store.
//!
//! The `prelude` module mirrors the surface application code touches;
//! backend implementors reach into [`core::kvs`] for the store contract.

pub use keeldb_core as core;

pub use keeldb_core::{DocumentStore, Error, ErrorKind, StoreOptions};

///
/// Prelude
///

pub mod prelude {
    pub use keeldb_core::prelude::*;
}
