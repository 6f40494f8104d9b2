//! Tree-structured parallel reduction.
//!
//! A reduction with `n` workers is a pipeline of fold stages of width `n`,
//! `n / 2`, `n / 4`, ... down to 2, followed by a sequential fold. Each
//! worker of a stage folds whatever items it happens to receive into a
//! single partial result and hands it to the next stage. A stage produces at
//! most as many partials as it has workers, so the intermediate conduits
//! never block and the depth of the tree is `O(log n)`.
//!
//! All stages share one [`Semaphore`] of `n` permits. A worker is spawned
//! only after it has a permit and holds it until it returns, which keeps the
//! number of live workers at `n` even while stages overlap.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::conduit::{channel, Conduit};
use crate::error::{contract, Error};
use crate::pool::unordered;
use crate::sync::Semaphore;
use crate::task::join_all;

/// Combine every item of `input` with `f` using up to `n` workers.
///
/// Returns `None` for an empty input. For `n > 1` items are combined in no
/// particular order, so `f` must be associative and commutative; with
/// `n == 1` it is a left fold and only associativity is needed.
///
/// # Panics
///
/// Panics if `n` is zero.
pub async fn reduce<T, F>(input: Conduit<T>, n: usize, f: F) -> Option<T>
where
    T: Send + 'static,
    F: Fn(T, T) -> T + Send + Sync + 'static,
{
    let n = contract(Error::check_concurrency(n));
    if n == 1 {
        return fold(input, &f).await;
    }
    debug!(workers = n, "starting tree reduce");
    tree(input, n, Semaphore::new(n), Arc::new(f)).await
}

/// Group items by key and combine the values of each key.
///
/// `mapper` runs on `nm` workers. With `nr == 1` the mapped pairs are folded
/// into a single map as they arrive; otherwise `nr` workers each build a
/// partial map and the partial maps are merged pairwise, always folding the
/// smaller map into the larger one.
///
/// # Panics
///
/// Panics if `nm` or `nr` is zero.
pub async fn map_reduce<T, K, V, M, R>(
    input: Conduit<T>,
    nm: usize,
    mapper: M,
    nr: usize,
    reducer: R,
) -> HashMap<K, V>
where
    T: Send + 'static,
    K: Eq + Hash + Send + 'static,
    V: Send + 'static,
    M: Fn(T) -> (K, V) + Send + Sync + 'static,
    R: Fn(V, V) -> V + Send + Sync + 'static,
{
    let nr = contract(Error::check_concurrency(nr));
    let mut mapped = unordered(input, nm, move |item: T| {
        std::future::ready(vec![mapper(item)])
    });

    if nr == 1 {
        let mut acc = HashMap::new();
        while let Some((key, value)) = mapped.recv().await {
            merge_entry(&mut acc, key, value, &reducer);
        }
        return acc;
    }

    let reducer = Arc::new(reducer);
    let permits = Semaphore::new(nr);

    let step = {
        let reducer = Arc::clone(&reducer);
        move |mut acc: HashMap<K, V>, (key, value): (K, V)| {
            merge_entry(&mut acc, key, value, &*reducer);
            acc
        }
    };
    let partials = fold_stage(
        mapped,
        nr,
        permits.clone(),
        Arc::new(|(key, value): (K, V)| HashMap::from([(key, value)])),
        Arc::new(step),
    );

    let merge = move |a: HashMap<K, V>, b: HashMap<K, V>| merge_maps(a, b, &*reducer);
    tree(partials, nr / 2, permits, Arc::new(merge))
        .await
        .unwrap_or_default()
}

/// Run fold stages of halving width over `input`, then fold what is left.
async fn tree<T, F>(input: Conduit<T>, width: usize, permits: Semaphore, f: Arc<F>) -> Option<T>
where
    T: Send + 'static,
    F: Fn(T, T) -> T + Send + Sync + 'static,
{
    let mut stage = input;
    let mut width = width;
    while width > 1 {
        stage = fold_stage(
            stage,
            width,
            permits.clone(),
            Arc::new(identity::<T>),
            Arc::clone(&f),
        );
        width /= 2;
    }
    fold(stage, &*f).await
}

fn identity<T>(item: T) -> T {
    item
}

/// Spawn up to `width` workers that each fold their share of `input` into
/// one partial result.
///
/// `seed` turns a worker's first item into its accumulator; `step` folds
/// every later item in. Workers acquire a permit before they are spawned.
fn fold_stage<T, A, S, F>(
    input: Conduit<T>,
    width: usize,
    permits: Semaphore,
    seed: Arc<S>,
    step: Arc<F>,
) -> Conduit<A>
where
    T: Send + 'static,
    A: Send + 'static,
    S: Fn(T) -> A + Send + Sync + 'static,
    F: Fn(A, T) -> A + Send + Sync + 'static,
{
    // Each worker sends at most one partial, so sends never wait.
    let (tx, partials) = channel(width);

    let driver = tokio::spawn(async move {
        let input = input.shared();
        let mut workers = JoinSet::new();
        for _ in 0..width {
            let permit = permits.acquire().await;
            let input = input.clone();
            let tx = tx.clone();
            let seed = Arc::clone(&seed);
            let step = Arc::clone(&step);
            workers.spawn(async move {
                let _permit = permit;
                let mut acc = None;
                while let Some(item) = input.recv().await {
                    acc = Some(match acc.take() {
                        None => seed(item),
                        Some(acc) => step(acc, item),
                    });
                }
                if let Some(acc) = acc {
                    let _ = tx.send(acc).await;
                }
            });
        }
        drop(tx);
        trace!(width, "fold stage spawned");
        join_all(workers).await;
    });
    partials.with_driver(driver)
}

async fn fold<T, F>(mut input: Conduit<T>, f: &F) -> Option<T>
where
    F: Fn(T, T) -> T,
{
    let mut acc = input.recv().await?;
    while let Some(item) = input.recv().await {
        acc = f(acc, item);
    }
    Some(acc)
}

fn merge_entry<K, V, R>(map: &mut HashMap<K, V>, key: K, value: V, reducer: &R)
where
    K: Eq + Hash,
    R: Fn(V, V) -> V,
{
    match map.remove(&key) {
        Some(existing) => map.insert(key, reducer(existing, value)),
        None => map.insert(key, value),
    };
}

fn merge_maps<K, V, R>(a: HashMap<K, V>, b: HashMap<K, V>, reducer: &R) -> HashMap<K, V>
where
    K: Eq + Hash,
    R: Fn(V, V) -> V,
{
    let (mut larger, smaller) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    for (key, value) in smaller {
        merge_entry(&mut larger, key, value, reducer);
    }
    larger
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conduit::from_iter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn sum_matches_sequential_fold() {
        for n in [1, 2, 3, 4, 8] {
            let total = reduce(from_iter(0..100u64), n, |a, b| a + b).await;
            assert_eq!(total, Some(4950), "n = {n}");
        }
    }

    #[tokio::test]
    async fn empty_and_single() {
        assert_eq!(reduce(from_iter(Vec::<u8>::new()), 4, |a, b| a + b).await, None);
        assert_eq!(reduce(from_iter(vec![7u8]), 4, |a, b| a + b).await, Some(7));
    }

    #[tokio::test]
    async fn single_worker_is_a_left_fold() {
        let words = vec!["a", "b", "c", "d"].into_iter().map(String::from);
        let joined = reduce(from_iter(words), 1, |a, b| a + &b).await;
        assert_eq!(joined.as_deref(), Some("abcd"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn live_folds_never_exceed_worker_count() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let f = {
            let (active, peak) = (Arc::clone(&active), Arc::clone(&peak));
            move |a: u64, b: u64| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_micros(200));
                active.fetch_sub(1, Ordering::SeqCst);
                a + b
            }
        };
        let total = reduce(from_iter(0..400u64), 4, f).await;
        assert_eq!(total, Some((0..400).sum()));
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn word_count() {
        let text = "the cat and the hat and the bat";
        let words: Vec<String> = text.split(' ').map(String::from).collect();
        for (nm, nr) in [(1, 1), (3, 1), (2, 4), (4, 3)] {
            let counts = map_reduce(from_iter(words.clone()), nm, |w| (w, 1), nr, |a, b| a + b).await;
            assert_eq!(counts.len(), 5);
            assert_eq!(counts["the"], 3);
            assert_eq!(counts["and"], 2);
            assert_eq!(counts["bat"], 1);
        }
    }

    #[tokio::test]
    async fn map_reduce_empty() {
        let counts = map_reduce(from_iter(Vec::<u8>::new()), 2, |x| (x, 1), 2, |a: u32, b| a + b).await;
        assert!(counts.is_empty());
    }

    #[test]
    fn merge_folds_smaller_into_larger() {
        let a = HashMap::from([(1, 10), (2, 20), (3, 30)]);
        let b = HashMap::from([(3, 3)]);
        let merged = merge_maps(b, a, &|x, y| x + y);
        assert_eq!(merged, HashMap::from([(1, 10), (2, 20), (3, 33)]));
    }
}
