//! Model Loader: authenticated decryption of model blobs into weights.
//!
//! Blob format: `[12-byte nonce][AES-256-GCM ciphertext + 16-byte tag]`.
//! The plaintext is the model's weights as consecutive little-endian `f32`.

use aes_gcm::aead::{Aead, AeadInPlace, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce, Tag};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

use crate::config::EnclaveConfig;
use crate::enclave::secret_store::{ModelWeights, ELEMENT_SIZE};
use crate::error::{EnclaveError, Result};
use crate::tee::epc;

/// 12-byte nonce size for AES-256-GCM.
pub const NONCE_SIZE: usize = 12;

/// 16-byte GCM authentication tag.
pub const TAG_SIZE: usize = 16;

/// Decrypts and validates model blobs. Holds no key material.
#[derive(Debug, Clone)]
pub struct ModelLoader {
    max_model_bytes: Option<u64>,
    enforce_epc_budget: bool,
    lock_memory: bool,
}

impl ModelLoader {
    pub fn from_config(config: &EnclaveConfig) -> Self {
        Self {
            max_model_bytes: config.max_model_bytes,
            enforce_epc_budget: config.enforce_epc_budget,
            lock_memory: config.lock_memory,
        }
    }

    /// Authenticate, decrypt and parse `blob` into model weights.
    ///
    /// Never returns partially decrypted or unauthenticated data: any
    /// failure drops the intermediate plaintext, which is zeroized.
    pub fn decrypt(&self, blob: &[u8], key: &[u8; 32]) -> Result<ModelWeights> {
        if blob.len() < NONCE_SIZE + TAG_SIZE {
            return Err(EnclaveError::DecryptionFailed(format!(
                "blob of {} bytes is too small to hold nonce and auth tag",
                blob.len()
            )));
        }

        let plaintext_len = (blob.len() - NONCE_SIZE - TAG_SIZE) as u64;
        self.check_budget(plaintext_len)?;

        let (nonce_bytes, sealed) = blob.split_at(NONCE_SIZE);
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| EnclaveError::KeyUnavailable(format!("Invalid AES key: {e}")))?;

        let mut plaintext = try_alloc::<u8>(ciphertext.len(), "plaintext bytes")?;
        plaintext.extend_from_slice(ciphertext);
        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(nonce_bytes),
                b"",
                plaintext.as_mut_slice(),
                Tag::from_slice(tag),
            )
            .map_err(|_| {
                EnclaveError::DecryptionFailed(
                    "authentication failed (wrong key or tampered data)".to_string(),
                )
            })?;

        let count = element_count(plaintext.len())?;

        let mut values = try_alloc::<f32>(count, "weights")?;
        values.extend(
            plaintext
                .chunks_exact(ELEMENT_SIZE)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
        );

        let digest: [u8; 32] = Sha256::digest(plaintext.as_slice()).into();
        tracing::debug!(weights = count, "Model blob authenticated and decrypted");

        Ok(ModelWeights::new(values, digest, self.lock_memory))
    }

    fn check_budget(&self, plaintext_len: u64) -> Result<()> {
        if let Some(max) = self.max_model_bytes {
            if plaintext_len > max {
                return Err(EnclaveError::AllocationFailed(format!(
                    "model of {plaintext_len} bytes exceeds configured limit of {max} bytes"
                )));
            }
        }
        if self.enforce_epc_budget && epc::model_exceeds_epc(plaintext_len) {
            return Err(EnclaveError::AllocationFailed(format!(
                "model of {plaintext_len} bytes exceeds the protected-memory budget"
            )));
        }
        Ok(())
    }
}

/// Reserve exactly `len` elements without aborting on allocation failure.
fn try_alloc<T: Zeroize>(len: usize, what: &str) -> Result<Zeroizing<Vec<T>>> {
    let mut buf: Zeroizing<Vec<T>> = Zeroizing::new(Vec::new());
    buf.try_reserve_exact(len).map_err(|e| {
        EnclaveError::AllocationFailed(format!("cannot reserve {len} {what}: {e}"))
    })?;
    Ok(buf)
}

/// Number of weights in `len` plaintext bytes. Rejects empty and ragged blobs.
pub fn element_count(len: usize) -> Result<usize> {
    if len == 0 {
        return Err(EnclaveError::MalformedModel(
            "decrypted model is empty".to_string(),
        ));
    }
    if len % ELEMENT_SIZE != 0 {
        return Err(EnclaveError::MalformedModel(format!(
            "decrypted length {len} is not a multiple of the {ELEMENT_SIZE}-byte element size"
        )));
    }
    Ok(len / ELEMENT_SIZE)
}

/// Encrypt raw plaintext into the blob format.
pub fn seal_bytes(plaintext: &[u8], key: &[u8; 32]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| EnclaveError::Config(format!("Invalid AES key: {e}")))?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| EnclaveError::Config(format!("Encryption failed: {e}")))?;

    let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Encrypt model weights for provisioning into the enclave (host side).
pub fn seal_weights(weights: &[f32], key: &[u8; 32]) -> Result<Vec<u8>> {
    let plaintext = Zeroizing::new(weights_to_bytes(weights));
    seal_bytes(&plaintext, key)
}

/// Serialize weights to their little-endian byte form.
pub fn weights_to_bytes(weights: &[f32]) -> Vec<u8> {
    weights.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// SHA-256 of the serialized weights, as bound into attestation reports.
pub fn weights_digest(weights: &[f32]) -> [u8; 32] {
    let bytes = Zeroizing::new(weights_to_bytes(weights));
    Sha256::digest(bytes.as_slice()).into()
}
