//! Error types for lrucache

use std::fmt;

/// Result type alias for lrucache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache construction
///
/// Lookups never fail: a missing key is `None`. Only misconfiguration is
/// reported through this type; broken internal invariants panic instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Capacity must hold at least one entry
    InvalidCapacity(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidCapacity(cap) => {
                write!(f, "Invalid capacity: {} (must be at least 1)", cap)
            }
        }
    }
}

impl std::error::Error for Error {}
