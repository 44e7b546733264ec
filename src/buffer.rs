//! Fallible working-buffer allocation.
//!
//! Chunk buffers can be large; an allocation failure must surface as
//! [`WarpError::Allocation`] instead of aborting the process.

use crate::error::{Result, WarpError};

/// Allocate `len` elements initialised to `value`.
///
/// # Errors
/// Returns [`WarpError::Allocation`] if the memory cannot be reserved.
pub fn alloc_filled<T: Clone>(len: usize, value: T, what: &str) -> Result<Vec<T>> {
    let bytes = len.saturating_mul(std::mem::size_of::<T>());
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| WarpError::allocation(bytes, what))?;
    buf.resize(len, value);
    Ok(buf)
}

/// Allocate a zeroed byte buffer.
///
/// # Errors
/// Returns [`WarpError::Allocation`] if the memory cannot be reserved.
pub fn alloc_bytes(len: usize, what: &str) -> Result<Vec<u8>> {
    alloc_filled(len, 0u8, what)
}
