//! Argument checks applied at every entry point before any buffer is touched.
//!
//! The host hands the boundary (pointer, length) pairs. Each pair must agree
//! with the buffer actually supplied and must not alias the secret region,
//! otherwise a host could read weights back out through an output buffer or
//! feed the enclave its own secrets as input.

use crate::error::{EnclaveError, Result};

/// A contiguous byte range in the boundary's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    start: usize,
    len: usize,
}

impl MemoryRegion {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// The bytes occupied by `slice`.
    pub fn of<T>(slice: &[T]) -> Self {
        Self {
            start: slice.as_ptr() as usize,
            len: std::mem::size_of_val(slice),
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Exclusive end address, saturating at the top of the address space.
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.len)
    }

    pub fn overlaps(&self, other: &MemoryRegion) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.start < other.end() && other.start < self.end()
    }
}

/// Check that the host's declared element count matches the buffer supplied.
pub fn check_declared_len(arg: &str, declared: usize, actual: usize) -> Result<()> {
    if declared != actual {
        return Err(EnclaveError::InvalidArgument(format!(
            "{arg}: declared length {declared} does not match buffer length {actual}"
        )));
    }
    Ok(())
}

/// Check that a host buffer lies entirely outside the secret region.
pub fn check_outside_secret(
    arg: &str,
    region: MemoryRegion,
    secret: Option<MemoryRegion>,
) -> Result<()> {
    if region.start().checked_add(region.len()).is_none() {
        return Err(EnclaveError::InvalidArgument(format!(
            "{arg}: buffer wraps the address space"
        )));
    }
    if let Some(secret) = secret {
        if region.overlaps(&secret) {
            tracing::warn!(arg, "Host buffer aliases secret memory; rejecting call");
            return Err(EnclaveError::InvalidArgument(format!(
                "{arg}: buffer overlaps protected memory"
            )));
        }
    }
    Ok(())
}

/// Run both checks for one host buffer.
pub fn check_host_buffer<T>(
    arg: &str,
    buf: &[T],
    declared: usize,
    secret: Option<MemoryRegion>,
) -> Result<()> {
    check_declared_len(arg, declared, buf.len())?;
    check_outside_secret(arg, MemoryRegion::of(buf), secret)
}
