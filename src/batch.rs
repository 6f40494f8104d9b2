//! Grouping items into bounded batches, and flattening them back.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::conduit::{channel, Conduit, STAGE_CAPACITY};
use crate::drain::drain_nb;
use crate::error::{contract, Error, Result};

/// Validated batching parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchPolicy {
    max_size: usize,
    timeout: Option<Duration>,
}

impl BatchPolicy {
    /// Batches of at most `max_size` items, flushed early once `timeout` has
    /// passed since the first item of the batch. `None` waits for size only.
    pub fn new(max_size: usize, timeout: Option<Duration>) -> Result<Self> {
        if max_size == 0 {
            return Err(Error::InvalidBatchSize);
        }
        let timeout = Error::check_timeout(timeout)?;
        Ok(Self { max_size, timeout })
    }

    /// Largest batch that will be emitted
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// How long a non-empty batch may wait for more items
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Group items into batches of up to `max_size`.
///
/// With `timeout` set, a batch is also flushed once that much time has
/// passed since its first item arrived. When `input` closes, a partial batch
/// is flushed before the output closes. Empty batches are never emitted.
///
/// # Panics
///
/// Panics if `max_size` is zero or `timeout` is `Some(Duration::ZERO)`.
pub fn batch<T: Send + 'static>(
    input: Conduit<T>,
    max_size: usize,
    timeout: Option<Duration>,
) -> Conduit<Vec<T>> {
    batch_with(input, contract(BatchPolicy::new(max_size, timeout)))
}

/// [`batch`] with a pre-validated policy.
pub fn batch_with<T: Send + 'static>(input: Conduit<T>, policy: BatchPolicy) -> Conduit<Vec<T>> {
    let (tx, out) = channel(STAGE_CAPACITY);
    let driver = tokio::spawn(async move {
        match policy.timeout {
            None => by_size(input, policy.max_size, tx).await,
            Some(timeout) => by_size_or_time(input, policy.max_size, timeout, tx).await,
        }
    });
    out.with_driver(driver)
}

async fn by_size<T: Send + 'static>(mut input: Conduit<T>, max: usize, tx: mpsc::Sender<Vec<T>>) {
    let mut pending = Vec::with_capacity(max);
    while let Some(item) = input.recv().await {
        pending.push(item);
        if pending.len() == max && !flush(&tx, &mut pending, max).await {
            drain_nb(input);
            return;
        }
    }
    if !pending.is_empty() {
        flush(&tx, &mut pending, 0).await;
    }
}

async fn by_size_or_time<T: Send + 'static>(
    mut input: Conduit<T>,
    max: usize,
    timeout: Duration,
    tx: mpsc::Sender<Vec<T>>,
) {
    let mut pending = Vec::with_capacity(max);
    let timer = tokio::time::sleep(timeout);
    tokio::pin!(timer);
    // Idle when false. The timer is only polled while collecting, so an
    // expiry left over from a batch that filled up never flushes the next.
    let mut armed = false;

    loop {
        tokio::select! {
            item = input.recv() => match item {
                Some(item) => {
                    if pending.is_empty() {
                        timer.as_mut().reset(Instant::now() + timeout);
                        armed = true;
                    }
                    pending.push(item);
                    if pending.len() < max {
                        continue;
                    }
                }
                None => break,
            },
            () = &mut timer, if armed => {
                trace!(len = pending.len(), "batch timeout expired");
            }
        }

        armed = false;
        if !flush(&tx, &mut pending, max).await {
            drain_nb(input);
            return;
        }
    }

    if !pending.is_empty() {
        flush(&tx, &mut pending, 0).await;
    }
}

/// Send the pending batch. Returns false when the output is gone.
async fn flush<T>(tx: &mpsc::Sender<Vec<T>>, pending: &mut Vec<T>, next_capacity: usize) -> bool {
    let batch = std::mem::replace(pending, Vec::with_capacity(next_capacity));
    count!("batonflow.batch.flushed");
    tx.send(batch).await.is_ok()
}

/// Flatten batches back into single items, keeping batch and in-batch
/// order.
pub fn unbatch<T: Send + 'static>(input: Conduit<Vec<T>>) -> Conduit<T> {
    let (tx, out) = channel(STAGE_CAPACITY);
    let driver = tokio::spawn(async move {
        let mut input = input;
        while let Some(batch) = input.recv().await {
            for item in batch {
                if tx.send(item).await.is_err() {
                    drain_nb(input);
                    return;
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

    #[tokio::test]
    async fn size_only() {
        let out = batch(from_iter(0..10), 4, None);
        assert_eq!(
            out.collect_vec().await,
            vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]
        );
    }

    #[tokio::test]
    async fn exact_multiple_has_no_trailing_batch() {
        let out = batch(from_iter(0..8), 4, Some(Duration::from_secs(10)));
        assert_eq!(
            out.collect_vec().await,
            vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]]
        );
    }

    #[tokio::test]
    async fn empty_input_yields_no_batches() {
        let out = batch(from_iter(Vec::<u8>::new()), 3, Some(Duration::from_millis(5)));
        assert!(out.collect_vec().await.is_empty());
    }

    #[tokio::test]
    async fn slow_producer_flushes_on_timeout() {
        let (tx, input) = channel(1);
        tokio::spawn(async move {
            for i in 0..6 {
                tx.send(i).await.unwrap();
                tokio::time::sleep(Duration::from_millis(40)).await;
            }
        });

        let batches = batch(input, 10, Some(Duration::from_millis(10)))
            .collect_vec()
            .await;
        assert!(batches.iter().any(|b| b.len() < 10));
        assert!(batches.iter().all(|b| !b.is_empty()));
        assert_eq!(batches.concat(), (0..6).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn size_flush_disarms_the_timer() {
        let (tx, input) = channel(1);
        let mut batches = batch(input, 2, Some(Duration::from_millis(100)));

        tx.send(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(90)).await;
        tx.send(2).await.unwrap();
        assert_eq!(batches.recv().await, Some(vec![1, 2]));

        // The first batch's deadline passes while the next one is young.
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(3).await.unwrap();
        let early = tokio::time::timeout(Duration::from_millis(50), batches.recv()).await;
        assert!(early.is_err(), "flushed on a stale deadline: {early:?}");

        assert_eq!(batches.recv().await, Some(vec![3]));
        drop(tx);
        assert_eq!(batches.recv().await, None);
    }

    #[tokio::test]
    async fn unbatch_restores_sequence() {
        let out = unbatch(batch(from_iter(0..23), 5, Some(Duration::from_millis(50))));
        assert_eq!(out.collect_vec().await, (0..23).collect::<Vec<_>>());
    }

    #[test]
    fn policy_validation() {
        assert_eq!(BatchPolicy::new(0, None), Err(Error::InvalidBatchSize));
        assert_eq!(
            BatchPolicy::new(3, Some(Duration::ZERO)),
            Err(Error::ZeroTimeout)
        );
        let p = BatchPolicy::new(3, None).unwrap();
        assert_eq!((p.max_size(), p.timeout()), (3, None));
    }

    #[tokio::test]
    #[should_panic(expected = "timeout must be positive")]
    async fn zero_timeout_panics() {
        let _ = batch(from_iter(0..3), 2, Some(Duration::ZERO));
    }
}
