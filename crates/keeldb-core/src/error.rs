use crate::{key::KeyError, kvs::KvsError};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable, machine-identifiable kind.
///

#[derive(Clone, Debug, Deserialize, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    #[must_use]
    pub fn document_not_found(collection: &str, key: impl Display) -> Self {
        Self::new(
            ErrorKind::DocumentNotFound,
            format!("document not found: {collection}/{key}"),
        )
    }

    #[must_use]
    pub fn document_exists(collection: &str, key: impl Display) -> Self {
        Self::new(
            ErrorKind::DocumentExists,
            format!("document already exists: {collection}/{key}"),
        )
    }

    #[must_use]
    pub fn transaction_misuse(operation: &str) -> Self {
        Self::new(
            ErrorKind::TransactionMisuse,
            format!("{operation} cannot run inside a transaction"),
        )
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::DocumentNotFound)
    }
}

impl From<KeyError> for Error {
    fn from(err: KeyError) -> Self {
        Self::new(ErrorKind::InvalidKey, err.to_string())
    }
}

impl From<KvsError> for Error {
    fn from(err: KvsError) -> Self {
        Self::new(ErrorKind::Backend, err.to_string())
    }
}

///
/// ErrorKind
/// One variant per caller-facing failure class.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    Config,
    IndexNotFound,
    DocumentNotFound,
    DocumentExists,
    InvalidKey,
    InvalidDocument,
    ReAddNotSupported,
    CannotDowngrade,
    TransactionMisuse,
    Backend,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Config => "config",
            Self::IndexNotFound => "index_not_found",
            Self::DocumentNotFound => "document_not_found",
            Self::DocumentExists => "document_exists",
            Self::InvalidKey => "invalid_key",
            Self::InvalidDocument => "invalid_document",
            Self::ReAddNotSupported => "re_add_not_supported",
            Self::CannotDowngrade => "cannot_downgrade",
            Self::TransactionMisuse => "transaction_misuse",
            Self::Backend => "backend",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///
