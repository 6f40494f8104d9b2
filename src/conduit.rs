//! Closable conduits connecting operators.
//!
//! A [`Conduit`] is the receiving end of a `tokio::sync::mpsc` channel. It
//! closes once every sender is dropped, so "the producer closes exactly once"
//! is enforced by ownership. A conduit may also carry the join handle of the
//! task feeding it: when the conduit closes, a panic in that task is
//! re-raised in whoever is reading, which is how panics in worker callbacks
//! reach the consumer's context.

use std::future::Future;
use std::panic;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures_core::Stream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

/// Capacity of the channels operators create between stages.
///
/// One pending item: a stage can run ahead of its consumer by a single item,
/// which is as close to a rendezvous as a tokio channel gets.
pub const STAGE_CAPACITY: usize = 1;

/// The receiving side of a stream of items.
///
/// An absent conduit ([`Conduit::absent`]) never yields and never closes.
pub struct Conduit<T> {
    rx: Option<mpsc::Receiver<T>>,
    driver: Option<JoinHandle<()>>,
}

impl<T> Conduit<T> {
    /// Wrap an mpsc receiver
    pub fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            rx: Some(rx),
            driver: None,
        }
    }

    /// A conduit that never produces and never closes.
    pub fn absent() -> Self {
        Self {
            rx: None,
            driver: None,
        }
    }

    /// Whether this is an absent conduit
    pub fn is_absent(&self) -> bool {
        self.rx.is_none()
    }

    /// Attach the task that feeds this conduit.
    ///
    /// The handle is awaited once the channel closes; a panic inside it is
    /// resumed in the reader.
    pub(crate) fn with_driver(mut self, driver: JoinHandle<()>) -> Self {
        debug_assert!(self.driver.is_none(), "conduit already has a driver");
        self.driver = Some(driver);
        self
    }

    /// Receive the next item, or `None` once the conduit is closed.
    pub async fn recv(&mut self) -> Option<T> {
        self.next().await
    }

    /// Read every remaining item into a vector.
    pub async fn collect_vec(mut self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(item) = self.recv().await {
            items.push(item);
        }
        items
    }

    /// Turn this conduit into a handle that many workers can read from.
    pub fn shared(self) -> Shared<T> {
        Shared(Arc::new(Mutex::new(self)))
    }
}

impl<T> From<mpsc::Receiver<T>> for Conduit<T> {
    fn from(rx: mpsc::Receiver<T>) -> Self {
        Self::new(rx)
    }
}

impl<T> std::fmt::Debug for Conduit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conduit")
            .field("absent", &self.is_absent())
            .field("driven", &self.driver.is_some())
            .finish()
    }
}

impl<T> Stream for Conduit<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        let Some(rx) = this.rx.as_mut() else {
            return Poll::Pending;
        };

        if let Some(item) = ready!(rx.poll_recv(cx)) {
            return Poll::Ready(Some(item));
        }

        if let Some(driver) = this.driver.as_mut() {
            let joined = ready!(Pin::new(driver).poll(cx));
            this.driver = None;
            if let Err(err) = joined {
                if err.is_panic() {
                    panic::resume_unwind(err.into_panic());
                }
            }
        }
        Poll::Ready(None)
    }
}

/// A conduit shared between several readers.
///
/// Readers take turns: each `recv` locks the conduit for the duration of one
/// receive.
pub struct Shared<T>(Arc<Mutex<Conduit<T>>>);

impl<T> Shared<T> {
    /// Receive the next item, or `None` once the conduit is closed.
    pub async fn recv(&self) -> Option<T> {
        self.0.lock().await.recv().await
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Create a sender and the conduit it feeds.
pub fn channel<T>(capacity: usize) -> (mpsc::Sender<T>, Conduit<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, Conduit::new(rx))
}

/// Spawn a producer that sends every item of `iter`, then closes.
///
/// The producer stops early if the conduit is dropped.
pub fn from_iter<I>(iter: I) -> Conduit<I::Item>
where
    I: IntoIterator + Send + 'static,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    let (tx, out) = channel(STAGE_CAPACITY);
    let driver = tokio::spawn(async move {
        for item in iter {
            if tx.send(item).await.is_err() {
                break;
            }
        }
    });
    out.with_driver(driver)
}

/// Spawn a producer that forwards every item of `stream`, then closes.
pub fn from_stream<S>(stream: S) -> Conduit<S::Item>
where
    S: Stream + Send + 'static,
    S::Item: Send + 'static,
{
    let (tx, out) = channel(STAGE_CAPACITY);
    let driver = tokio::spawn(async move {
        tokio::pin!(stream);
        while let Some(item) = stream.next().await {
            if tx.send(item).await.is_err() {
                break;
            }
        }
    });
    out.with_driver(driver)
}
