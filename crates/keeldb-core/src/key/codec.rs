use crate::{
    key::{DocKey, KeyElement, TupleKey},
    value,
};
use serde_json::Value;

///
/// KeyCodec
///
/// Builds every tuple the store persists under its name. Three key families
/// share the `[store]` prefix and stay disjoint because collection names
/// never contain `:` while index segments always do:
///
/// 1. `[store]`                                 → schema record
/// 2. `[store, collection, doc_key]`            → document
/// 3. `[store, "collection:index", v…, doc_key]` → index entry
///

#[derive(Clone, Debug)]
pub struct KeyCodec {
    store: String,
}

impl KeyCodec {
    #[must_use]
    pub fn new(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
        }
    }

    #[must_use]
    pub fn store_name(&self) -> &str {
        &self.store
    }

    /// Prefix owning every pair persisted by this store.
    #[must_use]
    pub fn store_prefix(&self) -> TupleKey {
        TupleKey::from_elements(vec![KeyElement::String(self.store.clone())])
    }

    /// Key of the single schema record.
    #[must_use]
    pub fn schema_key(&self) -> TupleKey {
        self.store_prefix()
    }

    /// Prefix of a collection's document range.
    #[must_use]
    pub fn document_prefix(&self, collection: &str) -> TupleKey {
        let mut key = self.store_prefix();
        key.push(collection);
        key
    }

    /// Address of a single document.
    #[must_use]
    pub fn document_key(&self, collection: &str, key: &DocKey) -> TupleKey {
        let mut tuple = self.document_prefix(collection);
        tuple.push(KeyElement::from(key));
        tuple
    }

    /// Prefix of an index's full entry range.
    #[must_use]
    pub fn index_prefix(&self, collection: &str, index: &str) -> TupleKey {
        let mut key = self.store_prefix();
        key.push(format!("{collection}:{index}"));
        key
    }

    /// Prefix of the index entries whose leading components equal `values`.
    ///
    /// Entries under this prefix are ordered by the remaining index
    /// properties and then by document key.
    #[must_use]
    pub fn index_value_prefix(
        &self,
        collection: &str,
        index: &str,
        values: &[KeyElement],
    ) -> TupleKey {
        let mut key = self.index_prefix(collection, index);
        for v in values {
            key.push(v.clone());
        }
        key
    }

    /// Address of a single index entry.
    #[must_use]
    pub fn index_key(
        &self,
        collection: &str,
        index: &str,
        values: &[KeyElement],
        key: &DocKey,
    ) -> TupleKey {
        let mut tuple = self.index_value_prefix(collection, index, values);
        tuple.push(KeyElement::from(key));
        tuple
    }
}

/// Cursor tuple for batched iteration: the values of `order` extracted from
/// `doc`, then the document key. With an empty `order` this is `[doc_key]`,
/// which positions a scan within the document range itself.
#[must_use]
pub fn order_cursor(key: &DocKey, doc: Option<&Value>, order: &[String]) -> TupleKey {
    let mut tuple = TupleKey::new();
    if !order.is_empty() {
        let flat = doc.map(value::flatten).unwrap_or_default();
        for path in order {
            let element = flat
                .get(path.as_str())
                .and_then(KeyElement::from_json)
                .unwrap_or(KeyElement::Null);
            tuple.push(element);
        }
    }
    tuple.push(KeyElement::from(key));
    tuple
}
