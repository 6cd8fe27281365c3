//! Index maintenance.
//!
//! Every document write carries the `(old, new)` pair for its key; the
//! maintainer diffs the pair per index and issues the minimal entry
//! delete/write so the index integrity invariant holds after the enclosing
//! transaction commits: an entry exists for a document iff none of its
//! extracted values is absent, and no other entries exist.

use crate::{
    error::Error,
    key::{DocKey, KeyCodec, KeyElement},
    kvs::{KeyValueStore, RemoveOptions, WriteOptions},
    model::{CollectionModel, IndexModel},
};
use serde_json::Value;

///
/// IndexMaintainer
///

pub(crate) struct IndexMaintainer<'a> {
    kvs: &'a dyn KeyValueStore,
    codec: &'a KeyCodec,
}

impl<'a> IndexMaintainer<'a> {
    pub const fn new(kvs: &'a dyn KeyValueStore, codec: &'a KeyCodec) -> Self {
        Self { kvs, codec }
    }

    /// Update every index of `collection` for one document write.
    /// `old` and `new` are absent for a create and a delete respectively.
    pub async fn apply(
        &self,
        collection: &CollectionModel,
        key: &DocKey,
        old: Option<&Value>,
        new: Option<&Value>,
    ) -> Result<(), Error> {
        for index in collection.indexes() {
            self.apply_index(collection.name(), index, key, old, new)
                .await?;
        }
        Ok(())
    }

    /// Update a single index for one document write. Also the unit of work
    /// for index rebuilds, which replay every document with `old` absent.
    pub async fn apply_index(
        &self,
        collection: &str,
        index: &IndexModel,
        key: &DocKey,
        old: Option<&Value>,
        new: Option<&Value>,
    ) -> Result<(), Error> {
        let old_values = index.extract_values(old);
        let new_values = index.extract_values(new);
        let old_projection = index.build_projection(old);
        let new_projection = index.build_projection(new);

        let values_differ = old_values != new_values;
        let projection_differs = old_projection != new_projection;

        if values_differ && let Some(values) = complete(&old_values) {
            let entry_key = self.codec.index_key(collection, index.name(), &values, key);
            self.kvs
                .delete(&entry_key, RemoveOptions::default())
                .await?;
        }

        if (values_differ || projection_differs)
            && let Some(values) = complete(&new_values)
        {
            let entry_key = self.codec.index_key(collection, index.name(), &values, key);
            let payload = new_projection.map_or(Value::Null, Value::Object);
            self.kvs
                .put(&entry_key, payload, WriteOptions::default())
                .await?;
        }

        Ok(())
    }
}

/// All-present values, or `None` when any extracted value is absent.
fn complete(values: &[Option<KeyElement>]) -> Option<Vec<KeyElement>> {
    values.iter().cloned().collect()
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        kvs::{MemoryKvs, ScanOptions},
        model::{CollectionDef, IndexDef},
    };
    use serde_json::json;

    fn fixture() -> (KeyCodec, CollectionModel) {
        let codec = KeyCodec::new("db");
        let collection = CollectionDef::new("people")
            .index(IndexDef::paths(["country", "city"]))
            .index(IndexDef::path("country").project(["firstName"]))
            .build()
            .unwrap();
        (codec, collection)
    }

    async fn index_entries(kvs: &MemoryKvs, codec: &KeyCodec, index: &str) -> Vec<String> {
        kvs.find(ScanOptions::prefix(codec.index_prefix("people", index)))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key.to_string())
            .collect()
    }

    #[tokio::test]
    async fn create_writes_one_entry_per_complete_index() {
        let (codec, collection) = fixture();
        let kvs = MemoryKvs::new();
        let doc = json!({ "country": "USA", "city": "Reno", "firstName": "Ada" });

        IndexMaintainer::new(&kvs, &codec)
            .apply(&collection, &DocKey::from("aaa"), None, Some(&doc))
            .await
            .unwrap();

        assert_eq!(index_entries(&kvs, &codec, "country+city").await.len(), 1);
        assert_eq!(index_entries(&kvs, &codec, "country").await.len(), 1);
    }

    #[tokio::test]
    async fn incomplete_values_suppress_the_entry() {
        let (codec, collection) = fixture();
        let kvs = MemoryKvs::new();
        let doc = json!({ "country": "USA", "firstName": "Ada" });

        IndexMaintainer::new(&kvs, &codec)
            .apply(&collection, &DocKey::from("aaa"), None, Some(&doc))
            .await
            .unwrap();

        // city is absent: the compound index skips this document.
        assert!(index_entries(&kvs, &codec, "country+city").await.is_empty());
        assert_eq!(index_entries(&kvs, &codec, "country").await.len(), 1);
    }

    #[tokio::test]
    async fn update_moves_the_entry_when_values_change() {
        let (codec, collection) = fixture();
        let kvs = MemoryKvs::new();
        let maintainer = IndexMaintainer::new(&kvs, &codec);
        let key = DocKey::from("aaa");

        let old = json!({ "country": "USA", "city": "Reno" });
        let new = json!({ "country": "USA", "city": "Tahoe" });

        maintainer
            .apply(&collection, &key, None, Some(&old))
            .await
            .unwrap();
        maintainer
            .apply(&collection, &key, Some(&old), Some(&new))
            .await
            .unwrap();

        let entries = index_entries(&kvs, &codec, "country+city").await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].contains("Tahoe"));
    }

    #[tokio::test]
    async fn unchanged_values_and_projection_write_nothing() {
        let (codec, collection) = fixture();
        let kvs = MemoryKvs::new();
        let maintainer = IndexMaintainer::new(&kvs, &codec);
        let key = DocKey::from("aaa");

        let old = json!({ "country": "USA", "city": "Reno", "firstName": "Ada", "age": 1 });
        let new = json!({ "country": "USA", "city": "Reno", "firstName": "Ada", "age": 2 });

        maintainer
            .apply(&collection, &key, None, Some(&old))
            .await
            .unwrap();
        let before = index_entries(&kvs, &codec, "country").await;

        maintainer
            .apply(&collection, &key, Some(&old), Some(&new))
            .await
            .unwrap();
        assert_eq!(index_entries(&kvs, &codec, "country").await, before);
    }

    #[tokio::test]
    async fn projection_change_rewrites_in_place() {
        let (codec, collection) = fixture();
        let kvs = MemoryKvs::new();
        let maintainer = IndexMaintainer::new(&kvs, &codec);
        let key = DocKey::from("aaa");

        let old = json!({ "country": "USA", "city": "Reno", "firstName": "Ada" });
        let new = json!({ "country": "USA", "city": "Reno", "firstName": "Grace" });

        maintainer
            .apply(&collection, &key, None, Some(&old))
            .await
            .unwrap();
        maintainer
            .apply(&collection, &key, Some(&old), Some(&new))
            .await
            .unwrap();

        let entry_key = codec.index_key(
            "people",
            "country",
            &[KeyElement::from("USA")],
            &key,
        );
        let payload = kvs
            .get(&entry_key, crate::kvs::ReadOptions::default())
            .await
            .unwrap()
            .expect("entry");
        assert_eq!(payload, json!({ "firstName": "Grace" }));
    }

    #[tokio::test]
    async fn delete_removes_every_entry() {
        let (codec, collection) = fixture();
        let kvs = MemoryKvs::new();
        let maintainer = IndexMaintainer::new(&kvs, &codec);
        let key = DocKey::from("aaa");
        let doc = json!({ "country": "USA", "city": "Reno", "firstName": "Ada" });

        maintainer
            .apply(&collection, &key, None, Some(&doc))
            .await
            .unwrap();
        maintainer
            .apply(&collection, &key, Some(&doc), None)
            .await
            .unwrap();

        assert!(index_entries(&kvs, &codec, "country+city").await.is_empty());
        assert!(index_entries(&kvs, &codec, "country").await.is_empty());
    }

    #[tokio::test]
    async fn projection_with_all_values_absent_stores_null() {
        let (codec, collection) = fixture();
        let kvs = MemoryKvs::new();
        let doc = json!({ "country": "USA", "city": "Reno" });

        IndexMaintainer::new(&kvs, &codec)
            .apply(&collection, &DocKey::from("aaa"), None, Some(&doc))
            .await
            .unwrap();

        let entry_key = codec.index_key(
            "people",
            "country",
            &[KeyElement::from("USA")],
            &DocKey::from("aaa"),
        );
        let payload = kvs
            .get(&entry_key, crate::kvs::ReadOptions::default())
            .await
            .unwrap()
            .expect("entry");
        assert_eq!(payload, Value::Null);
    }
}
