//! End-to-end walkthroughs of the store lifecycle against the memory
//! backend: statistics after creation, schema evolution across reopens,
//! and transactional behaviour of the public surface.

mod common;

use common::{backend, open_people, person, seed_people};
use keeldb::prelude::*;
use std::sync::Arc;

#[tokio::test]
async fn empty_collection_creation_persists_only_the_record() {
    let kvs = backend();
    let store = DocumentStore::with_backend(
        StoreOptions::new("test", "memory:").collection("People"),
        Arc::clone(&kvs),
    )
    .unwrap();

    let stats = store.get_statistics().await.unwrap();
    assert_eq!(stats.collections_count, 1);
    assert_eq!(stats.store.pairs_count, 1);
}

#[tokio::test]
async fn one_document_adds_one_pair() {
    let kvs = backend();
    let store = DocumentStore::with_backend(
        StoreOptions::new("test", "memory:").collection("People"),
        Arc::clone(&kvs),
    )
    .unwrap();

    store
        .put("People", "aaa", json!({ "p": "v" }), PutOptions::default())
        .await
        .unwrap();

    let stats = store.get_statistics().await.unwrap();
    assert_eq!(stats.store.pairs_count, 2);
}

#[tokio::test]
async fn collections_can_be_added_then_removed_then_purged() {
    let kvs = backend();

    let store = DocumentStore::with_backend(
        StoreOptions::new("test", "memory:").collection("C1"),
        Arc::clone(&kvs),
    )
    .unwrap();
    store.initialize_document_store().await.unwrap();
    store
        .put("C1", "aaa", json!({ "p": "v" }), PutOptions::default())
        .await
        .unwrap();

    // Reopen declaring C1 and C2.
    let store = DocumentStore::with_backend(
        StoreOptions::new("test", "memory:")
            .collection("C1")
            .collection("C2"),
        Arc::clone(&kvs),
    )
    .unwrap();
    let stats = store.get_statistics().await.unwrap();
    assert_eq!(stats.collections_count, 2);
    assert_eq!(stats.removed_collections_count, 0);

    // Reopen with only C2: C1 is retired but its documents stay.
    let store = DocumentStore::with_backend(
        StoreOptions::new("test", "memory:").collection("C2"),
        Arc::clone(&kvs),
    )
    .unwrap();
    let stats = store.get_statistics().await.unwrap();
    assert_eq!(stats.collections_count, 1);
    assert_eq!(stats.removed_collections_count, 1);
    assert_eq!(stats.store.pairs_count, 2);

    store.remove_collections_marked_as_removed().await.unwrap();
    let stats = store.get_statistics().await.unwrap();
    assert_eq!(stats.removed_collections_count, 0);
    assert_eq!(stats.store.pairs_count, 1);
}

#[tokio::test]
async fn indexes_can_be_added_then_removed_across_reopens() {
    let kvs = backend();

    let store = DocumentStore::with_backend(
        StoreOptions::new("test", "memory:").collection("People"),
        Arc::clone(&kvs),
    )
    .unwrap();
    store
        .put(
            "People",
            "aaa",
            json!({ "property1": "value1" }),
            PutOptions::default(),
        )
        .await
        .unwrap();

    // Reopen with an index: the existing document is backfilled.
    let store = DocumentStore::with_backend(
        StoreOptions::new("test", "memory:")
            .collection(CollectionDef::new("People").index("property1")),
        Arc::clone(&kvs),
    )
    .unwrap();
    let stats = store.get_statistics().await.unwrap();
    assert_eq!(stats.indexes_count, 1);
    assert_eq!(stats.store.pairs_count, 3);

    store
        .put(
            "People",
            "bbb",
            json!({ "property1": "value2" }),
            PutOptions::default(),
        )
        .await
        .unwrap();
    let stats = store.get_statistics().await.unwrap();
    assert_eq!(stats.store.pairs_count, 5);

    // Reopen without indexes: the whole index range is dropped.
    let store = DocumentStore::with_backend(
        StoreOptions::new("test", "memory:").collection("People"),
        Arc::clone(&kvs),
    )
    .unwrap();
    let stats = store.get_statistics().await.unwrap();
    assert_eq!(stats.indexes_count, 0);
    assert_eq!(stats.store.pairs_count, 3);
}

#[tokio::test]
async fn put_then_get_roundtrips_the_document() {
    let kvs = backend();
    let store = open_people(&kvs);

    let doc = json!({
        "firstName": "Manuel",
        "lastName": "Vila",
        "country": "France",
        "city": "Paris",
        "age": 40,
        "address": { "street": "1 rue de la Paix", "zip": "75002" },
        "tags": ["admin", null, 3.5],
    });
    store
        .put("People", "aaa", doc.clone(), PutOptions::default())
        .await
        .unwrap();

    let loaded = store
        .get("People", "aaa", GetOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded, doc);
}

#[tokio::test]
async fn delete_reports_whether_a_document_existed() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    assert!(
        store
            .delete("People", "aaa", DeleteOptions::default())
            .await
            .unwrap()
    );
    assert!(
        !store
            .delete("People", "aaa", DeleteOptions::optional())
            .await
            .unwrap()
    );

    let err = store
        .delete("People", "aaa", DeleteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::DocumentNotFound);

    let missing = store
        .get("People", "aaa", GetOptions::optional())
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn put_flags_enforce_create_and_update_modes() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    let err = store
        .put(
            "People",
            "aaa",
            person("X", "Y", "France", "Paris", 1),
            PutOptions::create(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::DocumentExists);

    let err = store
        .put(
            "People",
            "zzz",
            person("X", "Y", "France", "Paris", 1),
            PutOptions::update(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::DocumentNotFound);
}

#[tokio::test]
async fn invalid_keys_and_documents_are_rejected() {
    let kvs = backend();
    let store = open_people(&kvs);

    let err = store
        .put("People", "", json!({}), PutOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidKey);

    let err = store
        .put("People", "aaa", json!("not an object"), PutOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidDocument);
}

#[tokio::test]
async fn aborted_transactions_leave_documents_and_indexes_untouched() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    let result = store
        .transaction(|tx| async move {
            tx.put(
                "People",
                "aaa",
                person("Manuela", "Vilaba", "Spain", "Madrid", 41),
                PutOptions::default(),
            )
            .await?;

            // The scoped handle observes its own write.
            let staged = tx
                .get("People", "aaa", GetOptions::default())
                .await?
                .unwrap();
            assert_eq!(staged["firstName"], "Manuela");

            Err::<(), _>(Error::new(ErrorKind::Backend, "abort on purpose"))
        })
        .await;
    assert!(result.is_err());

    let doc = store
        .get("People", "aaa", GetOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc["firstName"], "Manuel");

    // The index write rolled back with the document: France still has
    // three members, Spain none.
    let spain = store
        .count("People", CountOptions::new().query(json!({ "country": "Spain" })))
        .await
        .unwrap();
    assert_eq!(spain, 0);
    let france = store
        .count("People", CountOptions::new().query(json!({ "country": "France" })))
        .await
        .unwrap();
    assert_eq!(france, 3);
}

#[tokio::test]
async fn committed_transactions_publish_all_writes_together() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    store
        .transaction(|tx| async move {
            tx.put(
                "People",
                "ggg",
                person("Gina", "Abbott", "USA", "Denver", 30),
                PutOptions::default(),
            )
            .await?;
            tx.delete("People", "eee", DeleteOptions::default()).await?;
            Ok(())
        })
        .await
        .unwrap();

    let usa = store
        .count("People", CountOptions::new().query(json!({ "country": "USA" })))
        .await
        .unwrap();
    assert_eq!(usa, 4);
    let france = store
        .count("People", CountOptions::new().query(json!({ "country": "France" })))
        .await
        .unwrap();
    assert_eq!(france, 2);
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let kvs = backend();
    let store = open_people(&kvs);

    store.initialize_document_store().await.unwrap();
    store.initialize_document_store().await.unwrap();

    // A fresh instance over the same backend only re-verifies.
    let store = open_people(&kvs);
    store.initialize_document_store().await.unwrap();

    let stats = store.get_statistics().await.unwrap();
    assert_eq!(stats.collections_count, 1);
}

#[tokio::test]
async fn destroy_all_resets_the_store() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    store.destroy_all().await.unwrap();

    // The next operation recreates the schema from scratch.
    let stats = store.get_statistics().await.unwrap();
    assert_eq!(stats.store.pairs_count, 1);
    assert_eq!(stats.collections_count, 1);
}
