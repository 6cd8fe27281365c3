use crate::model::{IndexDef, IndexModel, ModelError};
use std::collections::BTreeSet;

///
/// CollectionModel
///
/// A named bucket of documents with an ordered list of indexes. The order
/// is the declaration order and doubles as the tie-break when more than one
/// index satisfies a query.
///

#[derive(Clone, Debug)]
pub struct CollectionModel {
    name: String,
    indexes: Vec<IndexModel>,
}

impl CollectionModel {
    pub(crate) fn try_new(name: String, indexes: Vec<IndexModel>) -> Result<Self, ModelError> {
        if name.is_empty() {
            return Err(ModelError::UnnamedCollection);
        }
        // `:` is reserved for index key segments; allowing it here would let
        // a collection range collide with an index range.
        if name.contains(':') {
            return Err(ModelError::ReservedCollectionName { name });
        }

        for (i, index) in indexes.iter().enumerate() {
            if indexes[..i].iter().any(|other| other.keys() == index.keys()) {
                return Err(ModelError::DuplicateIndex {
                    collection: name,
                    name: index.name().to_owned(),
                });
            }
        }

        Ok(Self { name, indexes })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn indexes(&self) -> &[IndexModel] {
        &self.indexes
    }

    #[must_use]
    pub fn index_by_keys(&self, keys: &[String]) -> Option<&IndexModel> {
        self.indexes.iter().find(|index| index.keys() == keys)
    }

    /// Pick the index serving a `(query, order)` pair.
    ///
    /// The first `|query|` property keys of the index must equal the query's
    /// key set (the query is an unordered mapping), and the remaining keys
    /// must equal `order` exactly. The first declaration-order match wins.
    /// `Ok(None)` means both were empty: scan the document range directly.
    pub fn select_index(
        &self,
        query_keys: &BTreeSet<&str>,
        order: &[String],
    ) -> Result<Option<&IndexModel>, ModelError> {
        if query_keys.is_empty() && order.is_empty() {
            return Ok(None);
        }

        for index in &self.indexes {
            if index.keys().len() != query_keys.len() + order.len() {
                continue;
            }
            let (head, tail) = index.keys().split_at(query_keys.len());
            let head: BTreeSet<&str> = head.iter().map(String::as_str).collect();
            if &head == query_keys && tail == order {
                return Ok(Some(index));
            }
        }

        Err(ModelError::NoIndex {
            collection: self.name.clone(),
            query: query_keys.iter().copied().collect::<Vec<_>>().join(", "),
            order: order.join(", "),
        })
    }
}

///
/// CollectionDef
///
/// Declaration-time shape of a collection. A bare name declares a
/// collection with no indexes.
///

#[derive(Clone, Debug)]
pub struct CollectionDef {
    name: String,
    indexes: Vec<IndexDef>,
}

impl CollectionDef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: Vec::new(),
        }
    }

    #[must_use]
    pub fn index(mut self, index: impl Into<IndexDef>) -> Self {
        self.indexes.push(index.into());
        self
    }

    pub(crate) fn build(self) -> Result<CollectionModel, ModelError> {
        let indexes = self
            .indexes
            .into_iter()
            .map(IndexDef::build)
            .collect::<Result<Vec<_>, _>>()?;

        CollectionModel::try_new(self.name, indexes)
    }
}

impl From<&str> for CollectionDef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

///
/// TESTS
///
