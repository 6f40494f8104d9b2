//! Traits at the seams between operators and user code.
//!
//! - [`Processor`] is the per-item work run by the worker pools.
//! - [`Store`] is the backing store driven by [`forward`](crate::buffer::forward).

use async_trait::async_trait;
use std::future::Future;

/// Per-item work for the worker pools.
///
/// A processor turns one input into zero or more outputs. Any async closure
/// `Fn(T) -> impl Future<Output = Vec<U>>` is a processor.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use batonflow::traits::Processor;
///
/// struct Split;
///
/// #[async_trait]
/// impl Processor<String, String> for Split {
///     async fn process(&self, line: String) -> Vec<String> {
///         line.split_whitespace().map(str::to_owned).collect()
///     }
/// }
/// ```
#[async_trait]
pub trait Processor<T: Send + 'static, U: Send + 'static>: Send + Sync + 'static {
    /// Process one item. Returning an empty vector drops it.
    async fn process(&self, item: T) -> Vec<U>;
}

#[async_trait]
impl<T, U, F, Fut> Processor<T, U> for F
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Vec<U>> + Send,
    T: Send + 'static,
    U: Send + 'static,
{
    async fn process(&self, item: T) -> Vec<U> {
        (self)(item).await
    }
}

/// A buffer that a store-and-forward relay can drive.
///
/// The relay only calls `read` when `is_empty` is false and only calls
/// `write` when `is_full` is false.
pub trait Store<T>: Send + 'static {
    /// Number of held items
    fn len(&self) -> usize;

    /// Whether nothing is held
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `write` must not be called
    fn is_full(&self) -> bool;

    /// The item `read` would return
    fn peek(&self) -> Option<&T>;

    /// Remove and return the next item
    fn read(&mut self) -> Option<T>;

    /// Hold a new item
    fn write(&mut self, item: T);

    /// Periodic housekeeping, e.g. releasing memory.
    fn maintain(&mut self) {}
}
