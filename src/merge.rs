//! Fan-in of several conduits into one.

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::conduit::{channel, Conduit, STAGE_CAPACITY};
use crate::drain::drain_nb;
use crate::task::join_all;

/// Largest number of sources merged by a single select loop.
const SELECT_ARITY: usize = 5;

/// Merge `inputs` into one conduit.
///
/// Items from one source keep their relative order; nothing is promised
/// across sources. The output closes once every source has closed, so an
/// absent source keeps it open for good. Dropping the output releases the
/// merge and drains whatever the sources still produce.
///
/// Up to five sources are served by one task racing them all; more than
/// that get one forwarding task each.
pub fn merge<T: Send + 'static>(inputs: Vec<Conduit<T>>) -> Conduit<T> {
    let (tx, out) = channel(STAGE_CAPACITY);

    let driver = if inputs.len() <= SELECT_ARITY {
        debug!(sources = inputs.len(), "merging in one select loop");
        tokio::spawn(race(inputs, tx))
    } else {
        debug!(sources = inputs.len(), "merging with a task per source");
        tokio::spawn(fan_in(inputs, tx))
    };
    out.with_driver(driver)
}

async fn race<T: Send + 'static>(sources: Vec<Conduit<T>>, tx: mpsc::Sender<T>) {
    let mut open = [false; SELECT_ARITY];
    let mut slots: [Conduit<T>; SELECT_ARITY] = std::array::from_fn(|_| Conduit::absent());
    for (i, source) in sources.into_iter().enumerate() {
        slots[i] = source;
        open[i] = true;
    }
    let [mut s0, mut s1, mut s2, mut s3, mut s4] = slots;

    while open.iter().any(|o| *o) {
        let (i, item) = tokio::select! {
            item = s0.recv(), if open[0] => (0, item),
            item = s1.recv(), if open[1] => (1, item),
            item = s2.recv(), if open[2] => (2, item),
            item = s3.recv(), if open[3] => (3, item),
            item = s4.recv(), if open[4] => (4, item),
            () = tx.closed() => break,
        };
        match item {
            Some(item) => {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
            None => open[i] = false,
        }
    }

    if tx.is_closed() {
        trace!("merge output dropped");
        for (source, open) in [s0, s1, s2, s3, s4].into_iter().zip(open) {
            if open {
                drain_nb(source);
            }
        }
    }
}

async fn fan_in<T: Send + 'static>(sources: Vec<Conduit<T>>, tx: mpsc::Sender<T>) {
    let mut forwarders = JoinSet::new();
    for mut source in sources {
        let tx = tx.clone();
        forwarders.spawn(async move {
            loop {
                let item = tokio::select! {
                    item = source.recv() => item,
                    () = tx.closed() => break,
                };
                let Some(item) = item else {
                    return;
                };
                if tx.send(item).await.is_err() {
                    break;
                }
            }
            drain_nb(source);
        });
    }
    drop(tx);
    join_all(forwarders).await;
}
