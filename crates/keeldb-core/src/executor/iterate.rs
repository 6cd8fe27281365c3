use crate::{
    error::Error,
    executor::{ExecutorCtx, cursor_to_value, load},
    key::order_cursor,
    options::{Entry, FindOptions, ForEachOptions, Properties},
};
use std::future::Future;

/// Batched iteration over a query.
///
/// Each batch is one `find` with `limit = batch_size`; the next batch
/// starts after the order cursor of the last visited entry, so documents
/// written or deleted between batches never shift the walk. Stops on the
/// first empty batch. Returns how many visits reported `true`.
pub(crate) async fn for_each<F, Fut>(
    ctx: &ExecutorCtx<'_>,
    opts: &ForEachOptions,
    batch_size: usize,
    mut visit: F,
) -> Result<u64, Error>
where
    F: FnMut(Entry) -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
{
    // The advance cursor is built from the last entry's value, so the
    // fetched properties must cover every order path.
    if !opts.order.is_empty()
        && let Properties::Include(paths) = &opts.properties
        && opts.order.iter().any(|o| !paths.contains(o))
    {
        return Err(Error::config(
            "for_each properties must include every order property",
        ));
    }

    let batch_size = batch_size.max(1);
    let mut cursor = None;
    let mut hits = 0u64;

    loop {
        let find_opts = FindOptions {
            query: opts.query.clone(),
            order: opts.order.clone(),
            properties: opts.properties.clone(),
            start_after: cursor.take(),
            limit: Some(batch_size),
            ..FindOptions::default()
        };

        let batch = load::find(ctx, &find_opts).await?;
        let Some(last) = batch.last() else {
            return Ok(hits);
        };

        cursor = Some(cursor_to_value(&order_cursor(
            &last.key,
            last.value.as_ref(),
            &opts.order,
        )));

        for entry in batch {
            if visit(entry).await? {
                hits += 1;
            }
        }
    }
}
