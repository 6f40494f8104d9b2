//! Early termination without leaking the producer.
//!
//! Dropping a [`Conduit`] is enough to unblock its direct producer, but a
//! consumer that wants to stop early while keeping the stream alive (or an
//! operator that must keep reading its input to let an upstream stage
//! finish) uses the helpers here instead.

use std::sync::Arc;

use crate::conduit::{channel, Conduit, STAGE_CAPACITY};
use crate::sync::OnceWithWait;

/// Consume `input` until it closes, discarding every item.
///
/// Never returns for an absent conduit.
pub async fn drain<T>(mut input: Conduit<T>) {
    while input.recv().await.is_some() {}
}

/// Drain `input` in a background task.
///
/// Absent conduits are dropped instead, since they would never close.
pub fn drain_nb<T: Send + 'static>(input: Conduit<T>) {
    if input.is_absent() {
        return;
    }
    tokio::spawn(drain(input));
}

/// Handle that stops a [`breakable`] stream.
#[derive(Debug, Clone)]
pub struct Breaker(Arc<OnceWithWait>);

impl Breaker {
    /// Stop forwarding. Idempotent and callable from any thread.
    pub fn trigger(&self) {
        if self.0.call(|| {}) {
            debug!("stream break triggered");
            count!("batonflow.break.triggered");
        }
    }

    /// Whether [`trigger`](Breaker::trigger) has been called
    pub fn is_triggered(&self) -> bool {
        self.0.is_done()
    }
}

/// Wrap `input` so a consumer can stop it early.
///
/// Items are forwarded until the [`Breaker`] is triggered. From then on the
/// wrapper discards whatever `input` still produces, and closes its own
/// output once `input` has closed. The upstream producer is therefore never
/// left blocked on a send, even if nobody reads the output any more.
pub fn breakable<T: Send + 'static>(input: Conduit<T>) -> (Conduit<T>, Breaker) {
    let stop = Arc::new(OnceWithWait::new());
    let (tx, out) = channel(STAGE_CAPACITY);

    let relay = tokio::spawn({
        let stop = Arc::clone(&stop);
        let mut input = input;
        async move {
            loop {
                tokio::select! {
                    biased;
                    () = stop.wait() => break,
                    item = input.recv() => match item {
                        Some(item) => tokio::select! {
                            biased;
                            () = stop.wait() => break,
                            sent = tx.send(item) => if sent.is_err() {
                                break;
                            },
                        },
                        None => return,
                    },
                }
            }
            trace!("breakable relay draining upstream");
            drain(input).await;
            drop(tx);
        }
    });

    (out.with_driver(relay), Breaker(stop))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conduit::from_iter;
    use std::time::Duration;

    #[tokio::test]
    async fn forwards_until_triggered() {
        let (mut out, breaker) = breakable(from_iter(0..1_000));
        assert_eq!(out.recv().await, Some(0));
        assert_eq!(out.recv().await, Some(1));

        breaker.trigger();
        breaker.trigger();
        assert!(breaker.is_triggered());

        // At most the item already sitting in the channel slips through.
        let rest = tokio::time::timeout(Duration::from_secs(5), out.collect_vec())
            .await
            .expect("breakable output did not close");
        assert!(rest.len() <= 1, "forwarded {} items after break", rest.len());
    }

    #[tokio::test]
    async fn closes_with_upstream_when_never_triggered() {
        let (out, breaker) = breakable(from_iter(0..10));
        assert_eq!(out.collect_vec().await, (0..10).collect::<Vec<_>>());
        assert!(!breaker.is_triggered());
    }

    #[tokio::test]
    async fn drain_consumes_to_close() {
        let (tx, input) = channel(1);
        let producer = tokio::spawn(async move {
            for i in 0..100 {
                tx.send(i).await.unwrap();
            }
        });
        drain(input).await;
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn drain_nb_unblocks_producer() {
        let (tx, input) = channel(1);
        let producer = tokio::spawn(async move {
            for i in 0..100 {
                tx.send(i).await.unwrap();
            }
        });
        drain_nb(input);
        tokio::time::timeout(Duration::from_secs(5), producer)
            .await
            .expect("producer still blocked")
            .unwrap();
    }
}
