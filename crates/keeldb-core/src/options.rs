//! Per-operation options for the public store surface.

use crate::key::DocKey;
use serde_json::Value;

///
/// GetOptions
///

#[derive(Clone, Copy, Debug)]
pub struct GetOptions {
    pub error_if_missing: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            error_if_missing: true,
        }
    }
}

impl GetOptions {
    /// Missing documents yield `None` instead of an error.
    #[must_use]
    pub const fn optional() -> Self {
        Self {
            error_if_missing: false,
        }
    }
}

///
/// PutOptions
///

#[derive(Clone, Copy, Debug)]
pub struct PutOptions {
    pub create_if_missing: bool,
    pub error_if_exists: bool,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
        }
    }
}

impl PutOptions {
    /// Insert-only: fail when the document already exists.
    #[must_use]
    pub const fn create() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: true,
        }
    }

    /// Update-only: fail when the document is missing.
    #[must_use]
    pub const fn update() -> Self {
        Self {
            create_if_missing: false,
            error_if_exists: false,
        }
    }
}

///
/// DeleteOptions
///

#[derive(Clone, Copy, Debug)]
pub struct DeleteOptions {
    pub error_if_missing: bool,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            error_if_missing: true,
        }
    }
}

impl DeleteOptions {
    #[must_use]
    pub const fn optional() -> Self {
        Self {
            error_if_missing: false,
        }
    }
}

///
/// Properties
///
/// Which fields a query materialises. `All` fetches full documents;
/// `Include` names dotted paths, where an empty list returns keys only.
/// When an index projection covers every included path the query is
/// answered from the index entries without touching the documents.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Properties {
    #[default]
    All,
    Include(Vec<String>),
}

impl Properties {
    #[must_use]
    pub fn include<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Include(paths.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub const fn keys_only() -> Self {
        Self::Include(Vec::new())
    }
}

///
/// FindOptions
///

#[derive(Clone, Debug, Default)]
pub struct FindOptions {
    /// Equality filter: an object mapping index property keys to scalars.
    pub query: Option<Value>,
    /// Required ordering; must equal the trailing keys of some index.
    pub order: Vec<String>,
    pub properties: Properties,
    /// Inclusive lower cursor: a scalar or an array in the unpinned tail
    /// space of the chosen index (the document key space when unordered).
    pub start: Option<Value>,
    /// Exclusive lower cursor.
    pub start_after: Option<Value>,
    /// Inclusive upper cursor.
    pub end: Option<Value>,
    /// Exclusive upper cursor.
    pub end_before: Option<Value>,
    pub reverse: bool,
    pub limit: Option<usize>,
}

impl FindOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    #[must_use]
    pub fn order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order = order.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub fn start(mut self, cursor: Value) -> Self {
        self.start = Some(cursor);
        self
    }

    #[must_use]
    pub fn start_after(mut self, cursor: Value) -> Self {
        self.start_after = Some(cursor);
        self
    }

    #[must_use]
    pub fn end(mut self, cursor: Value) -> Self {
        self.end = Some(cursor);
        self
    }

    #[must_use]
    pub fn end_before(mut self, cursor: Value) -> Self {
        self.end_before = Some(cursor);
        self
    }

    #[must_use]
    pub const fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

///
/// CountOptions
///

#[derive(Clone, Debug, Default)]
pub struct CountOptions {
    pub query: Option<Value>,
    pub order: Vec<String>,
    pub start: Option<Value>,
    pub start_after: Option<Value>,
    pub end: Option<Value>,
    pub end_before: Option<Value>,
}

impl CountOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    #[must_use]
    pub fn order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order = order.into_iter().map(Into::into).collect();
        self
    }
}

///
/// ForEachOptions
///

#[derive(Clone, Debug, Default)]
pub struct ForEachOptions {
    pub query: Option<Value>,
    pub order: Vec<String>,
    pub properties: Properties,
    /// Rows per `find` batch; the store default applies when unset.
    pub batch_size: Option<usize>,
}

impl ForEachOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    #[must_use]
    pub fn order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order = order.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }
}

///
/// Entry
///
/// One query result: the document key and, depending on the requested
/// properties, the document, a trimmed view of it, or nothing.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub key: DocKey,
    pub value: Option<Value>,
}
