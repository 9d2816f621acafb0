//! Fallible buffer allocation.

use crate::error::{MvmError, Result};
use crate::types::Element;

/// Allocate a zero-initialised buffer of `len` elements, reporting
/// allocation failure as [`MvmError::OutOfMemory`] instead of aborting.
pub fn try_zeroed<T: Element>(len: usize, what: &'static str) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| MvmError::OutOfMemory {
        what,
        requested_bytes: len.saturating_mul(T::DTYPE.size_in_bytes()),
    })?;
    buf.resize(len, T::default());
    Ok(buf)
}
