//! # Composable concurrency primitives for tokio
//!
//! Operators in this crate read from and write to [`Conduit`]s: closable
//! streams backed by `tokio::sync::mpsc` channels. Each operator spawns the
//! tasks it needs and returns the conduit it writes to, so pipelines are
//! built by passing one operator's output to the next.
//!
//! ## Operators
//!
//! - **Worker pools**: [`unordered`] emits results as workers finish them;
//!   [`ordered`] overlaps the work but commits results in input order.
//! - **Drain/Breakable**: consume a conduit to release its producer, or stop
//!   relaying on demand.
//! - **Batch/Unbatch**: group items by size and timeout, and flatten back.
//! - **Reduce/MapReduce**: tree-structured parallel reduction.
//! - **Buffer/Prioritize**: decouple a producer from a slow consumer with a
//!   growable FIFO or a priority heap.
//! - **Merge**: fan several conduits into one.
//!
//! ## Example
//!
//! ```rust
//! use batonflow::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let squares = ordered(from_iter(1..=10u64), 4, |x: u64| async move { vec![x * x] });
//!     let batches = batch(squares, 3, None);
//!     let sums = unordered(batches, 2, |b: Vec<u64>| async move { vec![b.iter().sum::<u64>()] });
//!
//!     let total = reduce(sums, 2, |a, b| a + b).await;
//!     assert_eq!(total, Some(385));
//! }
//! ```

#[macro_use]
mod macros;

pub mod batch;
pub mod buffer;
pub mod conduit;
pub mod drain;
pub mod error;
pub mod merge;
pub mod pool;
pub mod reduce;
pub mod sync;
pub mod task;
pub mod traits;

// Re-export commonly used items
pub mod prelude {
    pub use crate::batch::{batch, batch_with, unbatch, BatchPolicy};
    pub use crate::buffer::{
        buffer, buffer_with, forward, prioritize, BufferConfig, Heap, RingBuffer,
    };
    pub use crate::conduit::{channel, from_iter, from_stream, Conduit, Shared};
    pub use crate::drain::{breakable, drain, drain_nb, Breaker};
    pub use crate::error::{Error, Result};
    pub use crate::merge::merge;
    pub use crate::pool::ordered::Turn;
    pub use crate::pool::{ordered, unordered};
    pub use crate::reduce::{map_reduce, reduce};
    pub use crate::task::join;
    pub use crate::traits::{Processor, Store};
}

pub use conduit::Conduit;
pub use error::{Error, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
