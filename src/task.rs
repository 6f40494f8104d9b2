//! Joining worker tasks without swallowing their panics.

use std::panic;

use tokio::task::{JoinError, JoinHandle, JoinSet};

/// Wait for every task in `set`.
///
/// The first panic aborts the remaining tasks and is resumed in the caller.
/// Cancelled tasks are ignored.
pub(crate) async fn join_all(mut set: JoinSet<()>) {
    while let Some(joined) = set.join_next().await {
        if let Err(err) = joined {
            set.abort_all();
            rethrow(err);
        }
    }
}

/// Await a handle returned by one of the `for_each` operators.
///
/// A panic raised inside a worker is resumed here.
pub async fn join(handle: JoinHandle<()>) {
    if let Err(err) = handle.await {
        rethrow(err);
    }
}

fn rethrow(err: JoinError) {
    if err.is_panic() {
        panic::resume_unwind(err.into_panic());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_all_waits_for_everyone() {
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut set = JoinSet::new();
        for _ in 0..8 {
            let counter = counter.clone();
            set.spawn(async move {
                tokio::task::yield_now().await;
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            });
        }
        join_all(set).await;
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 8);
    }

    #[tokio::test]
    #[should_panic(expected = "worker 3")]
    async fn join_all_resumes_panics() {
        let mut set = JoinSet::new();
        for i in 0..4 {
            set.spawn(async move {
                if i == 3 {
                    panic!("worker {i}");
                }
                std::future::pending::<()>().await;
            });
        }
        join_all(set).await;
    }
}
