//! Synchronization helpers shared by the operators.
//!
//! - [`Semaphore`] bounds how many workers run at once across a recursive
//!   call tree.
//! - [`OnceWithWait`] runs an action once and lets others await it.
//! - [`Baton`] and [`BatonPool`] are the single-slot tokens behind the
//!   ordered worker pool.

mod baton;
mod once;
mod semaphore;

pub use baton::{Baton, BatonPool};
pub use once::OnceWithWait;
pub use semaphore::{Permit, Semaphore};
