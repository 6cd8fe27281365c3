use crate::{
    error::{Error, ErrorKind},
    executor::ExecutorCtx,
    key::DocKey,
    kvs::{ReadOptions, WriteOptions},
    options::PutOptions,
};
use serde_json::Value;

/// Write one document and bring every index in line with it.
///
/// Must run on a transaction handle: the read of the previous document, the
/// document write, and the index side-effects commit or roll back together.
pub(crate) async fn put(
    ctx: &ExecutorCtx<'_>,
    key: &DocKey,
    doc: &Value,
    opts: PutOptions,
) -> Result<(), Error> {
    key.validate()?;
    if !doc.is_object() {
        return Err(Error::new(
            ErrorKind::InvalidDocument,
            format!("document must be an object: {}/{key}", ctx.collection.name()),
        ));
    }

    let tuple = ctx.codec.document_key(ctx.collection.name(), key);
    let old = ctx.kvs.get(&tuple, ReadOptions::default()).await?;

    if old.is_some() && opts.error_if_exists {
        return Err(Error::document_exists(ctx.collection.name(), key));
    }
    if old.is_none() && !opts.create_if_missing {
        return Err(Error::document_not_found(ctx.collection.name(), key));
    }

    ctx.kvs
        .put(&tuple, doc.clone(), WriteOptions::default())
        .await?;

    ctx.maintainer()
        .apply(ctx.collection, key, old.as_ref(), Some(doc))
        .await
}
