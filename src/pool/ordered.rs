//! The order-preserving worker pool.
//!
//! A relay task reads the input one item at a time and gives each item a
//! [`Baton`] of its own plus a handle to the baton of the item after it. The
//! first baton starts out passed. Workers run their computation as soon as
//! they pick an item up, then wait on their own baton before committing, and
//! pass the next baton once the commit is done. Computation overlaps freely;
//! commits happen strictly in input order.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::conduit::{channel, Conduit, STAGE_CAPACITY};
use crate::drain::drain_nb;
use crate::error::{contract, Error};
use crate::sync::{Baton, BatonPool};
use crate::traits::Processor;

/// Permission to commit the result of one item.
///
/// Every `Turn` handed to a worker function must be waited on exactly once,
/// before the ordered part of the work. `wait` takes `self`, so waiting twice
/// does not compile; returning without waiting breaks the ordering of every
/// later item and is not detected.
#[derive(Debug)]
pub struct Turn {
    baton: Option<Baton>,
}

impl Turn {
    /// A turn that is always ours. Used when there is a single worker.
    pub(crate) fn free() -> Self {
        Self { baton: None }
    }

    /// Wait until every earlier item has committed.
    pub async fn wait(self) {
        if let Some(baton) = &self.baton {
            baton.wait().await;
        }
    }
}

struct Ticket<T> {
    item: T,
    mine: Baton,
    next: Baton,
}

/// Run `f` over every item with `n` workers, granting commit turns in input
/// order.
///
/// `f` receives the item and its [`Turn`]; it may do any amount of work
/// before calling `turn.wait().await`, and everything it does after that
/// point happens in input order relative to the other items.
///
/// # Panics
///
/// Panics if `n` is zero.
pub fn for_each<T, F, Fut>(input: Conduit<T>, n: usize, f: F) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(T, Turn) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let n = contract(Error::check_concurrency(n));
    if n == 1 {
        return super::for_each(input, 1, move |item| f(item, Turn::free()));
    }

    let batons = Arc::new(BatonPool::new());
    let (work_tx, work) = channel(STAGE_CAPACITY);
    let relay = tokio::spawn(relay(input, work_tx, Arc::clone(&batons)));

    super::for_each(work.with_driver(relay), n, move |ticket: Ticket<T>| {
        let Ticket { item, mine, next } = ticket;
        let run = f(
            item,
            Turn {
                baton: Some(mine.clone()),
            },
        );
        let batons = Arc::clone(&batons);
        async move {
            run.await;
            next.pass();
            batons.put(mine);
        }
    })
}

async fn relay<T: Send + 'static>(
    mut input: Conduit<T>,
    work: mpsc::Sender<Ticket<T>>,
    batons: Arc<BatonPool>,
) {
    let mut current = batons.get();
    current.pass();

    while let Some(item) = input.recv().await {
        let next = batons.get();
        let ticket = Ticket {
            item,
            mine: current,
            next: next.clone(),
        };
        if work.send(ticket).await.is_err() {
            drain_nb(input);
            return;
        }
        current = next;
    }
}

/// Process items with `n` concurrent workers, emitting results in input
/// order.
///
/// # Panics
///
/// Panics if `n` is zero.
pub fn ordered<T, U, P>(input: Conduit<T>, n: usize, processor: P) -> Conduit<U>
where
    T: Send + 'static,
    U: Send + 'static,
    P: Processor<T, U>,
{
    let (tx, out) = channel(STAGE_CAPACITY);
    let processor = Arc::new(processor);

    let driver = for_each(input, n, move |item, turn| {
        let tx = tx.clone();
        let processor = Arc::clone(&processor);
        async move {
            let outputs = if tx.is_closed() {
                Vec::new()
            } else {
                processor.process(item).await
            };

            turn.wait().await;
            for output in outputs {
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
    use rand::Rng;
    use std::time::Duration;

    async fn jitter() {
        let ms = rand::thread_rng().gen_range(0..4u64);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test]
    async fn commits_follow_input_order() {
        for n in [1, 2, 5, 16] {
            let out = ordered(from_iter(0..200), n, |x: u32| async move {
                jitter().await;
                vec![x]
            });
            assert_eq!(out.collect_vec().await, (0..200).collect::<Vec<_>>(), "n = {n}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn multi_output_items_stay_grouped() {
        let out = ordered(from_iter(0..50), 8, |x: u32| async move {
            jitter().await;
            vec![x * 10, x * 10 + 1]
        });
        let expected: Vec<u32> = (0..50).flat_map(|x| [x * 10, x * 10 + 1]).collect();
        assert_eq!(out.collect_vec().await, expected);
    }

    #[tokio::test]
    async fn turns_serialize_the_commit_step() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let handle = for_each(from_iter(0..64), 6, {
            let log = Arc::clone(&log);
            move |x: usize, turn: Turn| {
                let log = Arc::clone(&log);
                async move {
                    jitter().await;
                    turn.wait().await;
                    log.lock().unwrap().push(x);
                }
            }
        });
        crate::task::join(handle).await;
        assert_eq!(*log.lock().unwrap(), (0..64).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn dropped_output_releases_every_task() {
        let metrics = tokio::runtime::Handle::current().metrics();
        let mut out = ordered(from_iter(0..1000), 4, |x: u32| async move { vec![x] });
        assert_eq!(out.recv().await, Some(0));
        drop(out);

        tokio::time::timeout(Duration::from_secs(5), async {
            while metrics.num_alive_tasks() > 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("pool tasks still alive after the output was dropped");
    }
}
