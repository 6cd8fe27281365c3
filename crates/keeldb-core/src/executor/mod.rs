//! Operation executors.
//!
//! One module per verb, sharing [`ExecutorCtx`]: a borrowed view of the
//! store handle currently in effect (root or transaction), the key codec,
//! and the target collection. Executors never open transactions; the facade
//! scopes them and hands the right KVS handle down.

pub(crate) mod delete;
pub(crate) mod iterate;
pub(crate) mod load;
pub(crate) mod save;

use crate::{
    error::Error,
    index::IndexMaintainer,
    key::{KeyCodec, KeyElement, TupleKey},
    kvs::KeyValueStore,
    model::CollectionModel,
};
use serde_json::Value;
use std::collections::BTreeMap;

///
/// ExecutorCtx
///

pub(crate) struct ExecutorCtx<'a> {
    pub kvs: &'a dyn KeyValueStore,
    pub codec: &'a KeyCodec,
    pub collection: &'a CollectionModel,
    /// Rows between cooperative yields during result materialisation.
    pub respiration: usize,
}

impl ExecutorCtx<'_> {
    pub(crate) const fn maintainer(&self) -> IndexMaintainer<'_> {
        IndexMaintainer::new(self.kvs, self.codec)
    }

    /// Yield to the runtime every `respiration` rows.
    pub(crate) async fn respire(&self, processed: usize) {
        if self.respiration > 0 && processed > 0 && processed % self.respiration == 0 {
            tokio::task::yield_now().await;
        }
    }
}

/// Parse the query option into key → scalar pairs.
pub(crate) fn parse_query(
    query: Option<&Value>,
) -> Result<BTreeMap<String, KeyElement>, Error> {
    let Some(query) = query else {
        return Ok(BTreeMap::new());
    };

    let Value::Object(map) = query else {
        return Err(Error::config("query must be an object"));
    };

    let mut out = BTreeMap::new();
    for (key, value) in map {
        let Some(element) = KeyElement::from_json(value) else {
            return Err(Error::config(format!(
                "query value for {key} must be a scalar"
            )));
        };
        out.insert(key.clone(), element);
    }
    Ok(out)
}

/// Normalise a cursor option (scalar or array) into a tuple.
pub(crate) fn parse_cursor(cursor: Option<&Value>) -> Result<Option<TupleKey>, Error> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let elements = match cursor {
        Value::Array(items) => items
            .iter()
            .map(KeyElement::from_json)
            .collect::<Option<Vec<_>>>(),
        scalar => KeyElement::from_json(scalar).map(|e| vec![e]),
    };

    match elements {
        Some(elements) => Ok(Some(TupleKey::from_elements(elements))),
        None => Err(Error::config("cursor values must be scalars")),
    }
}

/// Render a tuple cursor back into the option form `find` accepts.
pub(crate) fn cursor_to_value(cursor: &TupleKey) -> Value {
    Value::Array(cursor.iter().map(KeyElement::to_json).collect())
}
