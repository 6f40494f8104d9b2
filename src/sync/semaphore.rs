use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

/// A counting semaphore handed down through recursive operators.
///
/// Cloning shares the same permits. A worker acquires a [`Permit`] before it
/// is spawned and holds it for as long as it runs, so the number of live
/// workers across every holder of the semaphore never exceeds its capacity.
#[derive(Debug, Clone)]
pub struct Semaphore {
    inner: Arc<tokio::sync::Semaphore>,
    capacity: usize,
}

/// One unit of a [`Semaphore`], released on drop.
#[derive(Debug)]
pub struct Permit(#[allow(dead_code)] OwnedSemaphorePermit);

impl Semaphore {
    /// Create a semaphore with `capacity` permits
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(tokio::sync::Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a permit.
    pub async fn acquire(&self) -> Permit {
        match Arc::clone(&self.inner).acquire_owned().await {
            Ok(permit) => Permit(permit),
            // close() is never called on the inner semaphore
            Err(_) => unreachable!("batonflow semaphore closed"),
        }
    }

    /// Take a permit if one is free right now.
    pub fn try_acquire(&self) -> Option<Permit> {
        Arc::clone(&self.inner).try_acquire_owned().ok().map(Permit)
    }

    /// Total number of permits
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.inner.available_permits()
    }

    /// Permits currently held
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }
}
