//! Query semantics: index selection, ordering, projections, computed
//! indexes, cursors, and batched iteration.

mod common;

use common::{backend, keys_of, open_people, person, seed_people};
use keeldb::prelude::*;
use std::sync::Arc;

#[tokio::test]
async fn find_without_query_or_order_walks_the_document_range() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    let entries = store.find("People", FindOptions::new()).await.unwrap();
    assert_eq!(keys_of(&entries), ["aaa", "bbb", "ccc", "ddd", "eee", "fff"]);
    assert!(entries.iter().all(|e| e.value.is_some()));
}

#[tokio::test]
async fn find_with_keys_only_properties_skips_values() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    let entries = store
        .find(
            "People",
            FindOptions::new().properties(Properties::keys_only()),
        )
        .await
        .unwrap();
    assert_eq!(entries.len(), 6);
    assert!(entries.iter().all(|e| e.value.is_none()));
}

#[tokio::test]
async fn query_and_order_follow_the_compound_index() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    let entries = store
        .find(
            "People",
            FindOptions::new()
                .query(json!({ "country": "USA" }))
                .order(["city"]),
        )
        .await
        .unwrap();
    assert_eq!(keys_of(&entries), ["ccc", "bbb", "fff"]);

    let entries = store
        .find(
            "People",
            FindOptions::new()
                .query(json!({ "country": "USA" }))
                .order(["city"])
                .reverse(true),
        )
        .await
        .unwrap();
    assert_eq!(keys_of(&entries), ["fff", "bbb", "ccc"]);
}

#[tokio::test]
async fn unmatched_query_and_order_fail_with_index_not_found() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    let err = store
        .find(
            "People",
            FindOptions::new().query(json!({ "age": 40 })),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::IndexNotFound);

    let err = store
        .find(
            "People",
            FindOptions::new()
                .query(json!({ "country": "USA" }))
                .order(["age"]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::IndexNotFound);
}

#[tokio::test]
async fn covered_properties_are_served_from_the_projection() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    let entries = store
        .find(
            "People",
            FindOptions::new()
                .query(json!({ "country": "France" }))
                .properties(Properties::include(["firstName", "lastName"])),
        )
        .await
        .unwrap();

    assert_eq!(keys_of(&entries), ["aaa", "ddd", "eee"]);
    let first = entries[0].value.as_ref().unwrap();
    assert_eq!(
        first,
        &json!({ "firstName": "Manuel", "lastName": "Vila" })
    );
}

#[tokio::test]
async fn uncovered_properties_fall_back_to_fetching_documents() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    // age is not projected, so the store fetches the documents; the result
    // still carries exactly the requested fields.
    let entries = store
        .find(
            "People",
            FindOptions::new()
                .query(json!({ "country": "France" }))
                .properties(Properties::include(["firstName", "lastName", "age"])),
        )
        .await
        .unwrap();

    assert_eq!(keys_of(&entries), ["aaa", "ddd", "eee"]);
    let first = entries[0].value.as_ref().unwrap();
    assert_eq!(
        first,
        &json!({ "firstName": "Manuel", "lastName": "Vila", "age": 40 })
    );
}

#[tokio::test]
async fn computed_index_orders_by_the_derived_value() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    let entries = store
        .find("People", FindOptions::new().order(["fullNameSortKey"]))
        .await
        .unwrap();
    assert_eq!(keys_of(&entries), ["ccc", "bbb", "eee", "fff", "aaa", "ddd"]);
}

#[tokio::test]
async fn count_follows_the_same_index_selection() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    assert_eq!(store.count("People", CountOptions::new()).await.unwrap(), 6);
    assert_eq!(
        store
            .count(
                "People",
                CountOptions::new().query(json!({ "country": "USA" }))
            )
            .await
            .unwrap(),
        3
    );
    assert_eq!(
        store
            .count(
                "People",
                CountOptions::new().query(json!({ "country": "Japan" }))
            )
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn cursors_act_on_the_unpinned_index_components() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    // USA cities are Austin (ccc), Boston (bbb), Chicago (fff).
    let entries = store
        .find(
            "People",
            FindOptions::new()
                .query(json!({ "country": "USA" }))
                .order(["city"])
                .start_after(json!("Austin")),
        )
        .await
        .unwrap();
    assert_eq!(keys_of(&entries), ["bbb", "fff"]);

    let entries = store
        .find(
            "People",
            FindOptions::new()
                .query(json!({ "country": "USA" }))
                .order(["city"])
                .start(json!("Boston"))
                .end_before(json!("Chicago")),
        )
        .await
        .unwrap();
    assert_eq!(keys_of(&entries), ["bbb"]);
}

#[tokio::test]
async fn cursors_act_on_doc_keys_when_order_is_empty() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    let entries = store
        .find(
            "People",
            FindOptions::new().start_after(json!("bbb")).limit(2),
        )
        .await
        .unwrap();
    assert_eq!(keys_of(&entries), ["ccc", "ddd"]);
}

#[tokio::test]
async fn get_many_preserves_order_and_honours_error_if_missing() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    let entries = store
        .get_many("People", ["ccc", "aaa"], GetOptions::default())
        .await
        .unwrap();
    assert_eq!(keys_of(&entries), ["ccc", "aaa"]);

    let entries = store
        .get_many("People", ["ccc", "zzz", "aaa"], GetOptions::optional())
        .await
        .unwrap();
    assert_eq!(keys_of(&entries), ["ccc", "aaa"]);

    let err = store
        .get_many("People", ["ccc", "zzz"], GetOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::DocumentNotFound);
}

#[tokio::test]
async fn for_each_visits_every_document_once_for_any_batch_size() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    for batch_size in [1, 2, 3, 250] {
        let visited = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&visited);

        let count = store
            .for_each(
                "People",
                ForEachOptions::new()
                    .query(json!({ "country": "USA" }))
                    .order(["city"])
                    .batch_size(batch_size),
                move |entry| {
                    let sink = Arc::clone(&sink);
                    async move {
                        sink.lock().unwrap().push(entry.key.to_string());
                        Ok(())
                    }
                },
            )
            .await
            .unwrap();

        assert_eq!(count, 3, "batch_size {batch_size}");
        assert_eq!(*visited.lock().unwrap(), ["ccc", "bbb", "fff"]);
    }
}

#[tokio::test]
async fn find_and_delete_reports_only_actual_deletions() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    let deleted = store
        .find_and_delete(
            "People",
            ForEachOptions::new().query(json!({ "country": "France" })),
        )
        .await
        .unwrap();
    assert_eq!(deleted, 3);

    let remaining = store.count("People", CountOptions::new()).await.unwrap();
    assert_eq!(remaining, 3);

    let deleted = store
        .find_and_delete(
            "People",
            ForEachOptions::new().query(json!({ "country": "France" })),
        )
        .await
        .unwrap();
    assert_eq!(deleted, 0);
}

#[tokio::test]
async fn documents_missing_an_indexed_value_are_invisible_to_that_index() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    // No city: the country+city index skips it, country still sees it.
    store
        .put(
            "People",
            "ggg",
            json!({ "firstName": "Gus", "lastName": "Moss", "country": "USA" }),
            PutOptions::default(),
        )
        .await
        .unwrap();

    let by_city = store
        .find(
            "People",
            FindOptions::new()
                .query(json!({ "country": "USA" }))
                .order(["city"]),
        )
        .await
        .unwrap();
    assert_eq!(keys_of(&by_city), ["ccc", "bbb", "fff"]);

    let by_country = store
        .count(
            "People",
            CountOptions::new().query(json!({ "country": "USA" })),
        )
        .await
        .unwrap();
    assert_eq!(by_country, 4);
}

#[tokio::test]
async fn updates_move_index_entries_with_the_document() {
    let kvs = backend();
    let store = open_people(&kvs);
    seed_people(&store).await;

    let mut doc = person("Betty", "Bishop", "USA", "Boston", 32);
    doc["country"] = json!("Canada");
    doc["city"] = json!("Toronto");
    store
        .put("People", "bbb", doc, PutOptions::default())
        .await
        .unwrap();

    let usa = store
        .find(
            "People",
            FindOptions::new()
                .query(json!({ "country": "USA" }))
                .order(["city"]),
        )
        .await
        .unwrap();
    assert_eq!(keys_of(&usa), ["ccc", "fff"]);

    let canada = store
        .find(
            "People",
            FindOptions::new()
                .query(json!({ "country": "Canada" }))
                .order(["city"]),
        )
        .await
        .unwrap();
    assert_eq!(keys_of(&canada), ["bbb"]);
}
