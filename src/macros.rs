//! Internal logging and metrics macros.
//!
//! Both backends are optional features; with a feature off the matching
//! macros expand to nothing.

macro_rules! debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::debug!($($arg)*);
    };
}

macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::trace!($($arg)*);
    };
}

macro_rules! count {
    ($name:expr) => {
        #[cfg(feature = "metrics")]
        ::metrics::counter!($name).increment(1);
    };
}

macro_rules! gauge {
    ($name:expr, $value:expr) => {
        #[cfg(feature = "metrics")]
        ::metrics::gauge!($name).set($value as f64);
    };
}
