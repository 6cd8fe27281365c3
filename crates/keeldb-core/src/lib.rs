//! Document store runtime over a transactional ordered key-value store.
//!
//! ## Module layout
//! - `key`: composite tuple keys, document keys, and the key codec that
//!   maps documents and index entries onto the KVS key space.
//! - `value`: dotted-path access over dynamic JSON documents.
//! - `model`: collection and index metadata, plus index selection.
//! - `kvs`: the backend contract and the built-in memory backend.
//! - `index`: index maintenance for document writes.
//! - `executor`: one module per public verb.
//! - `schema`: the persisted schema record and the migration engine.
//! - `store`: the `DocumentStore` facade and transaction scoping.
//! - `obs`: store lifecycle events.

pub mod error;
pub mod key;
pub mod kvs;
pub mod model;
pub mod obs;
pub mod options;
pub mod schema;
pub mod value;

mod executor;
mod index;
mod store;

pub use error::{Error, ErrorKind};
pub use store::{DEFAULT_BATCH_SIZE, DEFAULT_RESPIRATION, DocumentStore, StoreOptions};

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        error::{Error, ErrorKind},
        key::DocKey,
        model::{CollectionDef, IndexDef},
        obs::{EventSink, StoreEvent},
        options::{
            CountOptions, DeleteOptions, Entry, FindOptions, ForEachOptions, GetOptions,
            Properties, PutOptions,
        },
        schema::Statistics,
        store::{DocumentStore, StoreOptions},
    };
    pub use serde_json::{Value, json};
}
