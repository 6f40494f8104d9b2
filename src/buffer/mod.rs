//! Elastic buffering between stages.
//!
//! [`forward`] is the one relay loop behind every buffering operator: it
//! moves items from an input conduit into a [`Store`] and from the store to
//! an output conduit, never blocking on one side while the other can make
//! progress. [`buffer`] plugs a [`RingBuffer`] into it for plain FIFO
//! decoupling; [`prioritize`] plugs a [`Heap`] into it to emit the best item
//! available at each moment.

pub mod heap;
pub mod ring;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::conduit::{channel, Conduit, STAGE_CAPACITY};
use crate::drain::drain_nb;
use crate::traits::Store;

pub use heap::Heap;
pub use ring::RingBuffer;

/// Configuration for buffering stages
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferConfig {
    /// Capacity floor of the ring buffer
    pub min_capacity: usize,
    /// How often the store gets a chance to release memory
    pub maintenance_interval: Duration,
    /// Capacity of the output channel
    pub output_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            min_capacity: RingBuffer::<()>::DEFAULT_MIN_CAPACITY,
            maintenance_interval: Duration::from_secs(1),
            output_capacity: STAGE_CAPACITY,
        }
    }
}

impl BufferConfig {
    /// Set the ring buffer capacity floor
    pub fn min_capacity(mut self, capacity: usize) -> Self {
        self.min_capacity = capacity;
        self
    }

    /// Set the maintenance interval
    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// Set the output channel capacity
    pub fn output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = capacity.max(1);
        self
    }
}

/// Relay items from `input` to the returned conduit through `store`.
///
/// The relay stops reading input while the store is full and stops offering
/// output while it is empty; otherwise it takes whichever happens first of
/// an input arriving, the consumer taking an item, or the maintenance tick.
/// The output closes once the input has closed and the store is empty.
pub fn forward<T, S>(input: Conduit<T>, store: S, config: &BufferConfig) -> Conduit<T>
where
    T: Send + 'static,
    S: Store<T>,
{
    let (tx, out) = channel(config.output_capacity);
    let driver = tokio::spawn(relay(input, store, tx, config.maintenance_interval));
    out.with_driver(driver)
}

async fn relay<T, S>(mut input: Conduit<T>, mut store: S, tx: mpsc::Sender<T>, every: Duration)
where
    T: Send + 'static,
    S: Store<T>,
{
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut open = true;

    loop {
        let can_read = open && !store.is_full();
        let can_write = !store.is_empty();
        if !open && !can_write {
            break;
        }

        tokio::select! {
            item = input.recv(), if can_read => match item {
                Some(item) => store.write(item),
                None => open = false,
            },
            permit = tx.reserve(), if can_write => match permit {
                Ok(permit) => {
                    if let Some(item) = store.read() {
                        permit.send(item);
                    }
                }
                Err(_) => {
                    trace!(held = store.len(), "buffer output dropped");
                    if open {
                        drain_nb(input);
                    }
                    return;
                }
            },
            _ = ticker.tick() => {
                store.maintain();
                gauge!("batonflow.buffer.len", store.len());
            }
        }
    }
}

/// An elastic FIFO stage.
///
/// Accepts input as fast as it arrives and hands it on as fast as the
/// consumer takes it, holding the difference in a [`RingBuffer`] whose
/// capacity never drops below `min_capacity`.
pub fn buffer<T: Send + 'static>(input: Conduit<T>, min_capacity: usize) -> Conduit<T> {
    buffer_with(input, BufferConfig::default().min_capacity(min_capacity))
}

/// [`buffer`] with explicit configuration.
pub fn buffer_with<T: Send + 'static>(input: Conduit<T>, config: BufferConfig) -> Conduit<T> {
    forward(input, RingBuffer::new(config.min_capacity), &config)
}

/// Reorder a stream by priority.
///
/// Held items are emitted best first according to `less` (see [`Heap`]).
/// With a `capacity`, at most that many items are held and input is paused
/// while the heap is full.
pub fn prioritize<T, F>(input: Conduit<T>, capacity: Option<usize>, less: F) -> Conduit<T>
where
    T: Send + 'static,
    F: Fn(&T, &T) -> bool + Send + 'static,
{
    let heap = match capacity {
        Some(capacity) => Heap::bounded(capacity.max(1), less),
        None => Heap::new(less),
    };
    forward(input, heap, &BufferConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conduit::from_iter;

    #[tokio::test]
    async fn buffer_is_fifo() {
        let out = buffer(from_iter(0..500), 4);
        assert_eq!(out.collect_vec().await, (0..500).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn fast_producer_is_not_blocked_by_idle_consumer() {
        let (tx, input) = channel(1);
        let producer = tokio::spawn(async move {
            for i in 0..1_000 {
                tx.send(i).await.unwrap();
            }
        });
        let out = buffer(input, 8);

        // Nobody reads `out` until the producer is done.
        tokio::time::timeout(Duration::from_secs(5), producer)
            .await
            .expect("producer blocked behind the buffer")
            .unwrap();
        assert_eq!(out.collect_vec().await.len(), 1_000);
    }

    #[tokio::test]
    async fn prioritize_emits_best_available() {
        let (tx, input) = channel(1);
        let out = prioritize(input, None, |a: &u32, b: &u32| a < b);
        for v in [5, 3, 9, 1, 7] {
            tx.send(v).await.unwrap();
        }
        // Give the relay time to pull everything in before anyone reads.
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(tx);

        // The first item to arrive may already sit in the output slot; the
        // rest were all held at once and come out best first.
        let got = out.collect_vec().await;
        assert!(got[1..].windows(2).all(|w| w[0] <= w[1]), "{got:?}");
        let mut sorted = got.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 3, 5, 7, 9]);
    }

    #[tokio::test]
    async fn bounded_prioritize_keeps_everything() {
        let out = prioritize(from_iter((0..100).rev()), Some(4), |a: &i32, b: &i32| a < b);
        let mut got = out.collect_vec().await;
        assert_eq!(got.len(), 100);
        got.sort_unstable();
        assert_eq!(got, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn maintenance_shrinks_after_a_burst() {
        let mut ring = RingBuffer::new(4);
        for i in 0..64 {
            Store::write(&mut ring, i);
        }
        for _ in 0..62 {
            Store::read(&mut ring);
        }
        while ring.capacity() > 4 {
            let before = ring.capacity();
            Store::maintain(&mut ring);
            assert_eq!(ring.capacity(), before / 2);
        }
        assert_eq!(Store::len(&ring), 2);
    }

    #[test]
    fn config_builder() {
        let config = BufferConfig::default()
            .min_capacity(64)
            .maintenance_interval(Duration::from_millis(250))
            .output_capacity(0);
        assert_eq!(config.min_capacity, 64);
        assert_eq!(config.maintenance_interval, Duration::from_millis(250));
        assert_eq!(config.output_capacity, 1);
    }
}
