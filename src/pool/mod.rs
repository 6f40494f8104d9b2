//! Worker pools.
//!
//! The pools here run a fixed number of tokio tasks over one shared input.
//! [`unordered`] emits results as workers finish them; [`ordered`] (in the
//! submodule of the same name) commits them in input order.
//!
//! With one worker both pools degrade to a single sequential task, which
//! also makes their output order deterministic.

pub mod ordered;

use std::future::Future;
use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};

use crate::conduit::{channel, Conduit, STAGE_CAPACITY};
use crate::error::{contract, Error};
use crate::task::join_all;
use crate::traits::Processor;

pub use ordered::ordered;

/// Run `f` over every item of `input` with `n` concurrent workers.
///
/// The returned handle completes once the input has closed and every worker
/// has returned. A panic in `f` aborts the other workers and is re-raised
/// through the handle (see [`task::join`](crate::task::join)).
///
/// # Panics
///
/// Panics if `n` is zero.
pub fn for_each<T, F, Fut>(input: Conduit<T>, n: usize, f: F) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let n = contract(Error::check_concurrency(n));

    if n == 1 {
        return tokio::spawn(async move {
            let mut input = input;
            while let Some(item) = input.recv().await {
                f(item).await;
            }
        });
    }

    debug!(workers = n, "starting worker pool");
    let input = input.shared();
    let f = Arc::new(f);
    let mut workers = JoinSet::new();
    for _ in 0..n {
        let input = input.clone();
        let f = Arc::clone(&f);
        workers.spawn(async move {
            while let Some(item) = input.recv().await {
                f(item).await;
            }
            trace!("worker finished");
        });
    }
    tokio::spawn(join_all(workers))
}

/// Process items with `n` concurrent workers, emitting results as they
/// complete.
///
/// Each item yields zero or more outputs. For `n > 1` the output order is
/// unspecified; with `n == 1` it follows the input. The output closes once
/// the input has closed and all workers are done. If the output is dropped,
/// the remaining input is consumed without being processed.
///
/// # Panics
///
/// Panics if `n` is zero.
pub fn unordered<T, U, P>(input: Conduit<T>, n: usize, processor: P) -> Conduit<U>
where
    T: Send + 'static,
    U: Send + 'static,
    P: Processor<T, U>,
{
    let (tx, out) = channel(STAGE_CAPACITY);
    let processor = Arc::new(processor);

    let driver = for_each(input, n, move |item| {
        let tx = tx.clone();
        let processor = Arc::clone(&processor);
        async move {
            if tx.is_closed() {
                return;
            }
            for output in processor.process(item).await {
                if tx.send(output).await.is_err() {
                    break;
                }
            }
        }
    });
    out.with_driver(driver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conduit::from_iter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn single_worker_keeps_order() {
        let out = unordered(from_iter(0..50), 1, |x: i32| async move { vec![x * 2] });
        let expected: Vec<i32> = (0..50).map(|x| x * 2).collect();
        assert_eq!(out.collect_vec().await, expected);
    }

    #[tokio::test]
    async fn processors_may_emit_many_or_none() {
        let out = unordered(from_iter(0..10), 3, |x: u32| async move {
            if x % 2 == 0 {
                vec![x, x]
            } else {
                vec![]
            }
        });
        let mut got = out.collect_vec().await;
        got.sort_unstable();
        assert_eq!(got, vec![0, 0, 2, 2, 4, 4, 6, 6, 8, 8]);
    }

    #[tokio::test]
    async fn for_each_visits_everything() {
        let seen = Arc::new(AtomicUsize::new(0));
        let handle = for_each(from_iter(1..=100), 4, {
            let seen = Arc::clone(&seen);
            move |x: usize| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(x, Ordering::SeqCst);
                }
            }
        });
        crate::task::join(handle).await;
        assert_eq!(seen.load(Ordering::SeqCst), 5050);
    }

    #[tokio::test]
    #[should_panic(expected = "bad item")]
    async fn worker_panic_reaches_consumer() {
        let out = unordered(from_iter(0..20), 4, |x: i32| async move {
            if x == 7 {
                panic!("bad item");
            }
            vec![x]
        });
        out.collect_vec().await;
    }

    #[test]
    #[should_panic(expected = "worker count")]
    fn zero_workers_is_rejected() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            let _ = for_each(Conduit::<u8>::absent(), 0, |_| async {});
        });
    }
}
