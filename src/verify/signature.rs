//! Ed25519 signature verification for reports from the simulated TEE.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use super::{constant_time_eq, HardwareVerifier};
use crate::error::{EnclaveError, Result};
use crate::tee::attestation::AttestationReport;

/// Verifies the Ed25519 signature carried by a report.
///
/// Without a pinned key this only proves the report was not altered after
/// signing; pin the provider's public key to also prove who signed it.
#[derive(Debug, Clone, Default)]
pub struct Ed25519ReportVerifier {
    pinned_key: Option<[u8; 32]>,
}

impl Ed25519ReportVerifier {
    /// Trust the key embedded in each report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept reports signed by `public_key`.
    pub fn pinned(public_key: [u8; 32]) -> Self {
        Self {
            pinned_key: Some(public_key),
        }
    }
}

impl HardwareVerifier for Ed25519ReportVerifier {
    fn verify_hardware_signature(&self, report: &AttestationReport) -> Result<()> {
        let key_bytes: [u8; 32] = report
            .signer_public_key
            .as_deref()
            .ok_or_else(|| fail("report carries no signer public key"))?
            .try_into()
            .map_err(|_| fail("signer public key must be 32 bytes"))?;

        if let Some(pinned) = &self.pinned_key {
            if !constant_time_eq(pinned, &key_bytes) {
                return Err(fail("report signed by an unexpected key"));
            }
        }

        let sig_bytes: [u8; 64] = report
            .signature
            .as_deref()
            .ok_or_else(|| fail("report is unsigned"))?
            .try_into()
            .map_err(|_| fail("signature must be 64 bytes"))?;

        let key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| fail(&format!("invalid signer public key: {e}")))?;
        key.verify(&report.signed_payload(), &Signature::from_bytes(&sig_bytes))
            .map_err(|_| fail("signature does not match report contents"))
    }
}

fn fail(msg: &str) -> EnclaveError {
    EnclaveError::AttestationVerificationFailed(msg.to_string())
}
