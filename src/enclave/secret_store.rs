//! Secret Store: sole owner of the decrypted model weights.
//!
//! Weight memory never leaves this module by reference outside the crate.
//! Buffers are locked in RAM while resident and overwritten with zeros
//! before they are released, including on replacement.

use zeroize::{Zeroize, Zeroizing};

use crate::enclave::boundary::MemoryRegion;
use crate::error::{EnclaveError, Result};

/// Size in bytes of one serialized weight (`f32`, little-endian).
pub const ELEMENT_SIZE: usize = std::mem::size_of::<f32>();

/// A fully decrypted, validated set of model weights.
pub struct ModelWeights {
    values: Zeroizing<Vec<f32>>,
    digest: [u8; 32],
    lock_requested: bool,
    locked: bool,
}

impl ModelWeights {
    /// Wrap decrypted weights. `digest` is the SHA-256 of their serialized form.
    ///
    /// With `lock_memory`, the pages are locked when the weights are
    /// installed into a [`SecretStore`], not here.
    pub(crate) fn new(values: Zeroizing<Vec<f32>>, digest: [u8; 32], lock_memory: bool) -> Self {
        Self {
            values,
            digest,
            lock_requested: lock_memory,
            locked: false,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    pub(crate) fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub(crate) fn region(&self) -> MemoryRegion {
        MemoryRegion::of(&self.values)
    }

    fn lock(&mut self) {
        if !self.lock_requested || self.locked {
            return;
        }
        match mlock_slice(&self.values) {
            Ok(()) => self.locked = true,
            Err(e) => tracing::warn!(error = %e, "mlock failed; weights may be swapped to disk"),
        }
    }

    /// Overwrite every weight with zero, then unlock the pages.
    ///
    /// The allocation stays live until drop.
    pub(crate) fn erase(&mut self) {
        self.values.as_mut_slice().zeroize();
        if self.locked {
            munlock_slice(&self.values);
            self.locked = false;
        }
    }
}

impl Drop for ModelWeights {
    fn drop(&mut self) {
        self.erase();
        tracing::debug!(weights = self.values.len(), "Zeroized model weights");
    }
}

impl std::fmt::Debug for ModelWeights {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelWeights")
            .field("len", &self.values.len())
            .field("digest", &hex::encode(self.digest))
            .field("locked", &self.locked)
            .finish()
    }
}

/// Holds at most one loaded model.
#[derive(Debug, Default)]
pub struct SecretStore {
    current: Option<ModelWeights>,
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    pub fn weight_count(&self) -> usize {
        self.current.as_ref().map_or(0, ModelWeights::len)
    }

    pub fn weight_at(&self, index: usize) -> Result<f32> {
        self.current
            .as_ref()
            .and_then(|w| w.as_slice().get(index).copied())
            .ok_or(EnclaveError::OutOfRange {
                index,
                count: self.weight_count(),
            })
    }

    /// SHA-256 of the loaded weights. Public data; the weights are not.
    pub fn model_digest(&self) -> Option<&[u8; 32]> {
        self.current.as_ref().map(ModelWeights::digest)
    }

    pub(crate) fn weights(&self) -> Option<&[f32]> {
        self.current.as_ref().map(ModelWeights::as_slice)
    }

    /// Address range of the resident weights, if any.
    pub(crate) fn region(&self) -> Option<MemoryRegion> {
        self.current.as_ref().map(ModelWeights::region)
    }

    /// Install `weights`, erasing and releasing the previous model.
    ///
    /// `munlock` is per page and not counted, and small models can share a
    /// page, so the previous model is unlocked before the new one is locked.
    pub(crate) fn install(&mut self, mut weights: ModelWeights) {
        drop(self.current.take());
        weights.lock();
        self.current = Some(weights);
    }

    /// Erase and release the current model, if any.
    pub(crate) fn clear(&mut self) {
        self.current = None;
    }
}

/// Lock the pages backing `values` so they are never swapped.
///
/// On Linux, calls `mlock(2)`. On other platforms, this is a no-op.
fn mlock_slice(values: &[f32]) -> std::io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        if values.is_empty() {
            return Ok(());
        }
        // Safety: pointer and length describe a live, initialized slice.
        let ret = unsafe {
            libc::mlock(
                values.as_ptr() as *const libc::c_void,
                std::mem::size_of_val(values),
            )
        };
        if ret != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = values;
    }
    Ok(())
}

/// Unlock pages previously locked with [`mlock_slice`].
fn munlock_slice(values: &[f32]) {
    #[cfg(target_os = "linux")]
    {
        if values.is_empty() {
            return;
        }
        // Safety: the range was locked by mlock_slice and is still allocated.
        unsafe {
            libc::munlock(
                values.as_ptr() as *const libc::c_void,
                std::mem::size_of_val(values),
            );
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = values;
    }
}
