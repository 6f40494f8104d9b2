use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

/// A single-slot, reusable signal.
///
/// `pass` leaves at most one pending signal; `wait` consumes it. A baton is
/// handed to exactly one waiter at a time: after a successful `wait` the
/// slot is empty again and the baton can be recycled through a
/// [`BatonPool`].
#[derive(Debug, Clone, Default)]
pub struct Baton(Arc<Notify>);

impl Baton {
    /// Create an unsignalled baton
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a baton that is already signalled
    pub fn passed() -> Self {
        let baton = Self::new();
        baton.pass();
        baton
    }

    /// Signal the baton. Signalling twice before a wait stores one signal.
    pub fn pass(&self) {
        self.0.notify_one();
    }

    /// Wait for the signal and consume it.
    pub async fn wait(&self) {
        self.0.notified().await;
    }
}

/// Free list of empty batons.
///
/// Only batons whose signal has been consumed may be returned with
/// [`put`](BatonPool::put); the pool holds no data, just empty slots.
#[derive(Debug, Default)]
pub struct BatonPool {
    free: Mutex<Vec<Baton>>,
}

impl BatonPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Take an empty baton, allocating one if the pool is dry.
    pub fn get(&self) -> Baton {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default()
    }

    /// Return an empty baton to the pool.
    pub fn put(&self, baton: Baton) {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(baton);
    }

    /// Number of batons waiting for reuse
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
