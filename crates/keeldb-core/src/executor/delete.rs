use crate::{
    error::Error,
    executor::ExecutorCtx,
    key::DocKey,
    kvs::{ReadOptions, RemoveOptions},
    options::DeleteOptions,
};

/// Remove one document and its index entries. Returns whether a document
/// was actually deleted.
///
/// Must run on a transaction handle, like [`super::save::put`].
pub(crate) async fn delete(
    ctx: &ExecutorCtx<'_>,
    key: &DocKey,
    opts: DeleteOptions,
) -> Result<bool, Error> {
    key.validate()?;

    let tuple = ctx.codec.document_key(ctx.collection.name(), key);
    let Some(old) = ctx.kvs.get(&tuple, ReadOptions::default()).await? else {
        if opts.error_if_missing {
            return Err(Error::document_not_found(ctx.collection.name(), key));
        }
        return Ok(false);
    };

    ctx.kvs.delete(&tuple, RemoveOptions::default()).await?;

    ctx.maintainer()
        .apply(ctx.collection, key, Some(&old), None)
        .await?;

    Ok(true)
}
