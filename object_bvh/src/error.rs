//! Error types for the object BVH
//!
//! This module defines the error types returned by index construction,
//! bounds extraction, refit and queries.

use std::fmt;

/// Result type for object BVH operations
pub type Result<T> = std::result::Result<T, Error>;

/// Object BVH errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Entity count or instance count does not fit the 32-bit primitive ID split
    CapacityExceeded(String),

    /// The scene no longer matches the entities and instances the index was built from
    TopologyChanged(String),

    /// Invalid caller input (primitive range, target buffer, root key)
    InvalidArgument(String),

    /// Requested feature is not available for this input
    NotImplemented(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CapacityExceeded(msg) => write!(f, "Index capacity exceeded: {}", msg),
            Error::TopologyChanged(msg) => write!(f, "Scene topology changed: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ===== ERROR MACROS =====

/// Build an [`Error`] of the given variant and log it at ERROR severity.
///
/// # Example
///
/// ```ignore
/// let err = bvh_err!(InvalidArgument, "object_bvh::ObjectBvh", "Unknown root {:?}", key);
/// ```
#[macro_export]
macro_rules! bvh_err {
    ($variant:ident, $source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::bvh_error!($source, "{}", message);
        $crate::Error::$variant(message)
    }};
}

/// Log and return an [`Error`] of the given variant from the enclosing function.
///
/// # Example
///
/// ```ignore
/// bvh_bail!(CapacityExceeded, "object_bvh::PrimitiveIdCodec", "{} entities", count);
/// ```
#[macro_export]
macro_rules! bvh_bail {
    ($variant:ident, $source:expr, $($arg:tt)*) => {
        return Err($crate::bvh_err!($variant, $source, $($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
