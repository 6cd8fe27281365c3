#![allow(dead_code)]

use keeldb::core::kvs::{KeyValueStore, MemoryKvs};
use keeldb::prelude::*;
use std::sync::Arc;

/// The People fixture: a compound index for country+city queries, a
/// projected index for country queries, and a computed sort-key index.
pub fn people_collection() -> CollectionDef {
    CollectionDef::new("People")
        .index(IndexDef::paths(["country", "city"]))
        .index(IndexDef::path("country").project(["firstName", "lastName"]))
        .index(IndexDef::computed("fullNameSortKey", full_name_sort_key).version(1))
}

pub fn full_name_sort_key(doc: &Value) -> Value {
    let first = doc.get("firstName").and_then(Value::as_str).unwrap_or("");
    let last = doc.get("lastName").and_then(Value::as_str).unwrap_or("");
    Value::String(format!("{last} {first}").trim().to_lowercase())
}

pub fn person(first: &str, last: &str, country: &str, city: &str, age: u32) -> Value {
    json!({
        "firstName": first,
        "lastName": last,
        "country": country,
        "city": city,
        "age": age,
    })
}

pub fn backend() -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryKvs::new())
}

pub fn open_people(kvs: &Arc<dyn KeyValueStore>) -> DocumentStore {
    DocumentStore::with_backend(
        StoreOptions::new("test", "memory:").collection(people_collection()),
        Arc::clone(kvs),
    )
    .unwrap()
}

pub async fn seed_people(store: &DocumentStore) {
    for (key, doc) in [
        ("aaa", person("Manuel", "Vila", "France", "Paris", 40)),
        ("bbb", person("Betty", "Bishop", "USA", "Boston", 32)),
        ("ccc", person("Carl", "Arnold", "USA", "Austin", 28)),
        ("ddd", person("Dora", "Walker", "France", "Lyon", 51)),
        ("eee", person("Eve", "Castle", "France", "Nice", 23)),
        ("fff", person("Fred", "Dawson", "USA", "Chicago", 45)),
    ] {
        store
            .put("People", key, doc, PutOptions::default())
            .await
            .unwrap();
    }
}

pub fn keys_of(entries: &[Entry]) -> Vec<String> {
    entries.iter().map(|e| e.key.to_string()).collect()
}
