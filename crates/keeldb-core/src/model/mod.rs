mod collection;
mod index;

pub use collection::{CollectionDef, CollectionModel};
pub use index::{ComputeFn, IndexDef, IndexModel, IndexProperty};

use crate::error::{Error, ErrorKind};
use thiserror::Error as ThisError;

///
/// ModelError
/// (declaration boundary: collection and index metadata)
///

#[derive(Clone, Debug, ThisError)]
pub enum ModelError {
    #[error("collection name must be non-empty")]
    UnnamedCollection,

    #[error("collection name must not contain ':': {name}")]
    ReservedCollectionName { name: String },

    #[error("collection {collection} declares duplicate name")]
    DuplicateCollection { collection: String },

    #[error("index must declare at least one property")]
    EmptyIndex,

    #[error("index property must have a non-empty key")]
    UnnamedProperty,

    #[error("index declares property {key} more than once")]
    DuplicateProperty { key: String },

    #[error("collection {collection} declares index {name} more than once")]
    DuplicateIndex { collection: String, name: String },

    #[error(
        "no index on collection {collection} matches query keys [{query}] and order [{order}]"
    )]
    NoIndex {
        collection: String,
        query: String,
        order: String,
    },
}

impl From<ModelError> for Error {
    fn from(err: ModelError) -> Self {
        let kind = match err {
            ModelError::NoIndex { .. } => ErrorKind::IndexNotFound,
            _ => ErrorKind::Config,
        };
        Self::new(kind, err.to_string())
    }
}
