use crate::{
    error::Error,
    executor::{ExecutorCtx, parse_cursor, parse_query},
    key::{DocKey, KeyElement},
    kvs::{ReadOptions, ScanEntry, ScanOptions},
    model::IndexModel,
    options::{CountOptions, Entry, FindOptions, GetOptions, Properties},
    value,
};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Point lookup by document key.
pub(crate) async fn get(
    ctx: &ExecutorCtx<'_>,
    key: &DocKey,
    opts: GetOptions,
) -> Result<Option<Value>, Error> {
    key.validate()?;

    let tuple = ctx.codec.document_key(ctx.collection.name(), key);
    let doc = ctx.kvs.get(&tuple, ReadOptions::default()).await?;

    if doc.is_none() && opts.error_if_missing {
        return Err(Error::document_not_found(ctx.collection.name(), key));
    }
    Ok(doc)
}

/// Vector point lookup preserving input order. Missing keys are dropped
/// unless `error_if_missing`.
pub(crate) async fn get_many(
    ctx: &ExecutorCtx<'_>,
    keys: &[DocKey],
    opts: GetOptions,
) -> Result<Vec<Entry>, Error> {
    let mut tuples = Vec::with_capacity(keys.len());
    for key in keys {
        key.validate()?;
        tuples.push(ctx.codec.document_key(ctx.collection.name(), key));
    }

    let values = ctx.kvs.get_many(&tuples, ReadOptions::default()).await?;

    let mut out = Vec::with_capacity(keys.len());
    for (i, (key, doc)) in keys.iter().zip(values).enumerate() {
        match doc {
            Some(doc) => out.push(Entry {
                key: key.clone(),
                value: Some(doc),
            }),
            None if opts.error_if_missing => {
                return Err(Error::document_not_found(ctx.collection.name(), key));
            }
            None => {}
        }
        ctx.respire(i + 1).await;
    }
    Ok(out)
}

/// Ordered query over the collection.
pub(crate) async fn find(ctx: &ExecutorCtx<'_>, opts: &FindOptions) -> Result<Vec<Entry>, Error> {
    let query = parse_query(opts.query.as_ref())?;
    let query_keys = query.keys().map(String::as_str).collect();
    let index = ctx.collection.select_index(&query_keys, &opts.order)?;

    let scan = ScanOptions {
        start: parse_cursor(opts.start.as_ref())?,
        start_after: parse_cursor(opts.start_after.as_ref())?,
        end: parse_cursor(opts.end.as_ref())?,
        end_before: parse_cursor(opts.end_before.as_ref())?,
        reverse: opts.reverse,
        limit: opts.limit,
        ..ScanOptions::default()
    };

    match index {
        None => find_documents(ctx, scan, &opts.properties).await,
        Some(index) => find_indexed(ctx, index, &query, scan, &opts.properties).await,
    }
}

/// Count of the documents a query matches; never fetches values.
pub(crate) async fn count(ctx: &ExecutorCtx<'_>, opts: &CountOptions) -> Result<u64, Error> {
    let query = parse_query(opts.query.as_ref())?;
    let query_keys = query.keys().map(String::as_str).collect();
    let index = ctx.collection.select_index(&query_keys, &opts.order)?;

    let prefix = match index {
        None => ctx.codec.document_prefix(ctx.collection.name()),
        Some(index) => {
            let values = pinned_values(index, &query);
            ctx.codec
                .index_value_prefix(ctx.collection.name(), index.name(), &values)
        }
    };

    let scan = ScanOptions {
        start: parse_cursor(opts.start.as_ref())?,
        start_after: parse_cursor(opts.start_after.as_ref())?,
        end: parse_cursor(opts.end.as_ref())?,
        end_before: parse_cursor(opts.end_before.as_ref())?,
        return_values: false,
        ..ScanOptions::prefix(prefix)
    };

    Ok(ctx.kvs.count(scan).await?)
}

/// Scan of the raw document range, used when no index is involved.
async fn find_documents(
    ctx: &ExecutorCtx<'_>,
    scan: ScanOptions,
    properties: &Properties,
) -> Result<Vec<Entry>, Error> {
    let keys_only = *properties == Properties::keys_only();
    let scan = ScanOptions {
        prefix: Some(ctx.codec.document_prefix(ctx.collection.name())),
        return_values: !keys_only,
        ..scan
    };

    let scanned = ctx.kvs.find(scan).await?;

    let mut out = Vec::with_capacity(scanned.len());
    for (i, entry) in scanned.into_iter().enumerate() {
        let key = doc_key_of(&entry)?;
        let val = match properties {
            Properties::All => entry.value,
            Properties::Include(paths) if paths.is_empty() => None,
            Properties::Include(paths) => entry.value.as_ref().map(|doc| value::pick(doc, paths)),
        };
        out.push(Entry { key, value: val });
        ctx.respire(i + 1).await;
    }
    Ok(out)
}

/// How an indexed find materialises its values.
enum Materialise {
    KeysOnly,
    FromProjection,
    FullFetch,
}

async fn find_indexed(
    ctx: &ExecutorCtx<'_>,
    index: &IndexModel,
    query: &BTreeMap<String, KeyElement>,
    scan: ScanOptions,
    properties: &Properties,
) -> Result<Vec<Entry>, Error> {
    let values = pinned_values(index, query);
    let prefix = ctx
        .codec
        .index_value_prefix(ctx.collection.name(), index.name(), &values);

    let mode = match properties {
        Properties::Include(paths) if paths.is_empty() => Materialise::KeysOnly,
        Properties::Include(paths) if index.covers(paths) => Materialise::FromProjection,
        Properties::Include(paths) => {
            debug!(
                collection = ctx.collection.name(),
                index = index.name(),
                requested = ?paths,
                "projection does not cover the requested properties; fetching documents"
            );
            Materialise::FullFetch
        }
        Properties::All => Materialise::FullFetch,
    };

    let scan = ScanOptions {
        prefix: Some(prefix),
        return_values: matches!(mode, Materialise::FromProjection),
        ..scan
    };

    let scanned = ctx.kvs.find(scan).await?;

    match mode {
        Materialise::KeysOnly => {
            let mut out = Vec::with_capacity(scanned.len());
            for entry in &scanned {
                out.push(Entry {
                    key: doc_key_of(entry)?,
                    value: None,
                });
            }
            Ok(out)
        }
        Materialise::FromProjection => {
            let Properties::Include(paths) = properties else {
                unreachable!("projection mode requires an include list");
            };
            let mut out = Vec::with_capacity(scanned.len());
            for (i, entry) in scanned.into_iter().enumerate() {
                let key = doc_key_of(&entry)?;
                let payload = entry.value.unwrap_or(Value::Null);
                out.push(Entry {
                    key,
                    value: Some(value::pick(&payload, paths)),
                });
                ctx.respire(i + 1).await;
            }
            Ok(out)
        }
        Materialise::FullFetch => fetch_documents(ctx, &scanned, properties).await,
    }
}

/// Second pass: resolve scanned index entries to their documents.
async fn fetch_documents(
    ctx: &ExecutorCtx<'_>,
    scanned: &[ScanEntry],
    properties: &Properties,
) -> Result<Vec<Entry>, Error> {
    let mut keys = Vec::with_capacity(scanned.len());
    let mut tuples = Vec::with_capacity(scanned.len());
    for entry in scanned {
        let key = doc_key_of(entry)?;
        tuples.push(ctx.codec.document_key(ctx.collection.name(), &key));
        keys.push(key);
    }

    let docs = ctx.kvs.get_many(&tuples, ReadOptions::default()).await?;

    let mut out = Vec::with_capacity(keys.len());
    for (i, (key, doc)) in keys.into_iter().zip(docs).enumerate() {
        let Some(doc) = doc else {
            return Err(Error::document_not_found(ctx.collection.name(), &key));
        };
        let val = match properties {
            Properties::All => doc,
            Properties::Include(paths) => value::pick(&doc, paths),
        };
        out.push(Entry {
            key,
            value: Some(val),
        });
        ctx.respire(i + 1).await;
    }
    Ok(out)
}

/// Values of the pinned (queried) leading index components, in index order.
fn pinned_values(index: &IndexModel, query: &BTreeMap<String, KeyElement>) -> Vec<KeyElement> {
    index.keys()[..query.len()]
        .iter()
        .filter_map(|key| query.get(key).cloned())
        .collect()
}

/// The document key is the trailing element of both key families.
fn doc_key_of(entry: &ScanEntry) -> Result<DocKey, Error> {
    let Some(last) = entry.key.last() else {
        return Err(Error::new(
            crate::error::ErrorKind::Backend,
            format!("malformed stored key: {}", entry.key),
        ));
    };
    DocKey::from_element(last).map_err(Error::from)
}
