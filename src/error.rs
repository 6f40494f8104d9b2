//! Error types for the fallible constructors of the operator set.
//!
//! Most operators report misuse by panicking, since a zero timeout or an
//! overfull heap is a bug in the caller rather than a runtime condition.
//! The variants here back the `try_*`/validating entry points for callers
//! that would rather check first.

use std::time::Duration;

/// The main error type for batonflow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A batch size of zero was requested
    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    /// A batch timeout of zero was requested
    #[error("batch timeout must be positive (use None to wait for size only)")]
    ZeroTimeout,

    /// A worker count of zero was requested
    #[error("worker count must be at least 1")]
    InvalidConcurrency,

    /// A fixed-capacity heap was asked to hold more than it can
    #[error("heap at capacity: {capacity}")]
    HeapFull { capacity: usize },

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }

    /// Validate a worker count.
    pub(crate) fn check_concurrency(n: usize) -> Result<usize> {
        if n == 0 {
            Err(Error::InvalidConcurrency)
        } else {
            Ok(n)
        }
    }

    /// Validate a batch timeout. `None` means "no time bound".
    pub(crate) fn check_timeout(timeout: Option<Duration>) -> Result<Option<Duration>> {
        match timeout {
            Some(t) if t.is_zero() => Err(Error::ZeroTimeout),
            other => Ok(other),
        }
    }
}

/// Unwrap a contract check, panicking with the error's message.
///
/// Used by the infallible operator entry points: a failed check there is
/// caller misuse and must fail loudly.
#[track_caller]
pub(crate) fn contract<T>(res: Result<T>) -> T {
    match res {
        Ok(v) => v,
        Err(e) => panic!("batonflow: {e}"),
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;
