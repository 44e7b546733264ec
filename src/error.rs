//! Error types shared by every stage of a warp.
//!
//! The warper is fail-fast: each component reports the first failure upward
//! and nothing retries internally. The variants below mirror the failure
//! classes a caller may want to tell apart.

use crate::raster::StoreError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WarpError>;

#[derive(thiserror::Error, Debug)]
pub enum WarpError {
    /// The warp options violate one or more invariants.
    #[error("invalid warp options: {0}")]
    Config(String),

    /// The coordinate transformer failed, or too few sample points survived.
    #[error("transform error: {0}")]
    Transform(String),

    /// A working buffer could not be allocated.
    #[error("out of memory allocating {bytes} bytes for {what}")]
    Allocation { bytes: usize, what: String },

    /// A raster store read or write failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The resampling kernel reported a failure.
    #[error("warp kernel error: {0}")]
    Kernel(String),

    /// The progress callback asked to stop.
    #[error("warp cancelled by progress callback")]
    Cancelled,

    /// A broken internal contract (wrong mask slot, mismatched buffer size).
    #[error("internal error: {0}")]
    Internal(String),
}

impl WarpError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform(msg.into())
    }

    pub fn allocation(bytes: usize, what: impl Into<String>) -> Self {
        Self::Allocation {
            bytes,
            what: what.into(),
        }
    }

    pub fn kernel(msg: impl Into<String>) -> Self {
        Self::Kernel(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True when the error came from a progress callback asking to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_message() {
        let err = WarpError::allocation(4096, "destination buffer");
        assert_eq!(
            err.to_string(),
            "out of memory allocating 4096 bytes for destination buffer"
        );
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: WarpError = StoreError::ReadOnly { band: 2 }.into();
        assert_eq!(err.to_string(), StoreError::ReadOnly { band: 2 }.to_string());
        assert!(!err.is_cancelled());
        assert!(WarpError::Cancelled.is_cancelled());
    }
}
