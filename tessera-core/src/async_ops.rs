//! Sequential asynchronous collection helpers.
//!
//! Every helper awaits one step before starting the next, so side effects
//! (cache fills in particular) happen in input order.

use std::future::Future;

use serde_json::Value;

/// Elements of a JSON sequence; any other value is treated as empty.
pub fn sequence_of(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items.as_slice(),
        _ => &[],
    }
}

/// Map each element, in order.
pub async fn map_async<I, T, U, F, Fut>(items: I, mut f: F) -> Vec<U>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T, usize) -> Fut,
    Fut: Future<Output = U>,
{
    let iter = items.into_iter();
    let mut out = Vec::with_capacity(iter.size_hint().0);
    for (index, item) in iter.enumerate() {
        out.push(f(item, index).await);
    }
    out
}

/// Run `f` for each element, in order.
pub async fn for_each_async<I, T, F, Fut>(items: I, mut f: F)
where
    I: IntoIterator<Item = T>,
    F: FnMut(T, usize) -> Fut,
    Fut: Future<Output = ()>,
{
    for (index, item) in items.into_iter().enumerate() {
        f(item, index).await;
    }
}

/// Keep the elements whose predicate resolves `true`.
pub async fn filter_async<I, T, F, Fut>(items: I, mut predicate: F) -> Vec<T>
where
    I: IntoIterator<Item = T>,
    F: FnMut(&T, usize) -> Fut,
    Fut: Future<Output = bool>,
{
    let mut out = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        if predicate(&item, index).await {
            out.push(item);
        }
    }
    out
}

/// Left fold. An empty input returns `init` unchanged.
pub async fn reduce_async<I, T, A, F, Fut>(items: I, init: A, mut f: F) -> A
where
    I: IntoIterator<Item = T>,
    F: FnMut(A, T, usize) -> Fut,
    Fut: Future<Output = A>,
{
    let mut acc = init;
    for (index, item) in items.into_iter().enumerate() {
        acc = f(acc, item, index).await;
    }
    acc
}

/// Fallible [`map_async`]; stops at the first error.
pub async fn try_map_async<I, T, U, E, F, Fut>(items: I, mut f: F) -> Result<Vec<U>, E>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T, usize) -> Fut,
    Fut: Future<Output = Result<U, E>>,
{
    let iter = items.into_iter();
    let mut out = Vec::with_capacity(iter.size_hint().0);
    for (index, item) in iter.enumerate() {
        out.push(f(item, index).await?);
    }
    Ok(out)
}

/// Fallible [`reduce_async`]; stops at the first error.
pub async fn try_reduce_async<I, T, A, E, F, Fut>(items: I, init: A, mut f: F) -> Result<A, E>
where
    I: IntoIterator<Item = T>,
    F: FnMut(A, T, usize) -> Fut,
    Fut: Future<Output = Result<A, E>>,
{
    let mut acc = init;
    for (index, item) in items.into_iter().enumerate() {
        acc = f(acc, item, index).await?;
    }
    Ok(acc)
}
