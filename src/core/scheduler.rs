//! Fan-out / fan-in join primitives.
//!
//! Both primitives interleave futures on the calling task; nothing is
//! spawned. They resolve once every member operation has finished, and
//! member failures are returned as values rather than short-circuiting.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use futures::future::join_all;
use futures::stream::{self, StreamExt};

/// Run `operation` once per item and wait for all of them.
///
/// `limit` bounds how many operations are in flight at once (`None` is
/// unbounded). Results come back in item order.
pub async fn parallel<I, T, F, Fut, R>(items: I, limit: Option<usize>, operation: F) -> Vec<R>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    let operations = items.into_iter().map(operation);
    match limit {
        None => join_all(operations).await,
        Some(limit) => {
            stream::iter(operations)
                .buffered(limit.max(1))
                .collect()
                .await
        }
    }
}

/// Run a keyed set of operations concurrently and collect results by key.
///
/// Operations of differing concrete types can be boxed with
/// `FutureExt::boxed`.
pub async fn mapped<K, I, Fut, T>(operations: I) -> HashMap<K, T>
where
    K: Eq + Hash,
    I: IntoIterator<Item = (K, Fut)>,
    Fut: Future<Output = T>,
{
    let (keys, futures): (Vec<K>, Vec<Fut>) = operations.into_iter().unzip();
    let results = join_all(futures).await;
    keys.into_iter().zip(results).collect()
}
