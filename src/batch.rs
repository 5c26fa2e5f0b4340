//! Bounded-concurrency chunk runner.
//!
//! Items are split into chunks of `limit`; every future in a chunk is driven
//! together with [`join_all`] and the next chunk starts only after the whole
//! chunk has finished. At most `limit` futures are ever in flight.

use std::future::Future;

use futures::future::join_all;

/// Run `f` over `items`, `limit` at a time. Output order matches input order.
///
/// `on_chunk` is called after each chunk with the number of items finished
/// so far, for progress reporting.
pub async fn run_chunked<T, R, F, Fut>(
    items: Vec<T>,
    limit: usize,
    f: F,
    mut on_chunk: impl FnMut(usize),
) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let limit = limit.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut items = items.into_iter().peekable();

    while items.peek().is_some() {
        let chunk: Vec<Fut> = items.by_ref().take(limit).map(&f).collect();
        results.extend(join_all(chunk).await);
        on_chunk(results.len());
    }

    results
}
