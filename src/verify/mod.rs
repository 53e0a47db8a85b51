//! Client-side attestation report verification.
//!
//! Checks that a report returned by `GenerateAttestation` is bound to the
//! nonce the client sent and, when pinned, to the expected model digest and
//! platform measurement.
//!
//! # What this module verifies (offline)
//!
//! 1. **Nonce binding**: `report_data[0..32]` equals `SHA-256(nonce)`.
//! 2. **Model digest binding**: `report_data[32..64]` equals the SHA-256 of
//!    the model weights the client expects.
//! 3. **Measurement**: the launch digest equals a known-good value.
//! 4. **TEE type**: simulated reports are rejected unless explicitly allowed.
//! 5. **Signature**: delegated to a [`HardwareVerifier`], e.g.
//!    [`Ed25519ReportVerifier`] for the simulated provider.
//!
//! # Example
//!
//! ```rust,no_run
//! use a3s_enclave::verify::{decode_report, verify_report, VerifyOptions};
//!
//! # fn example(bytes: &[u8]) -> anyhow::Result<()> {
//! let report = decode_report(bytes)?;
//! let opts = VerifyOptions {
//!     nonce: Some(vec![0u8; 16]),
//!     allow_simulated: true,
//!     ..Default::default()
//! };
//! verify_report(&report, &opts)?;
//! # Ok(())
//! # }
//! ```

mod signature;

pub use signature::Ed25519ReportVerifier;

use sha2::{Digest, Sha256};

use crate::error::{EnclaveError, Result};
use crate::tee::attestation::{AttestationReport, TeeType, REPORT_DATA_LEN};

/// Options controlling which checks are performed during verification.
#[derive(Default)]
pub struct VerifyOptions<'a> {
    /// Nonce the client sent (raw bytes).
    pub nonce: Option<Vec<u8>>,

    /// Expected SHA-256 of the model weights (32 bytes).
    pub expected_model_digest: Option<Vec<u8>>,

    /// Expected platform measurement (raw bytes).
    pub expected_measurement: Option<Vec<u8>>,

    /// Accept reports from the simulated TEE.
    pub allow_simulated: bool,

    /// Signature verifier. When `None`, signature checks are skipped.
    pub hardware_verifier: Option<&'a dyn HardwareVerifier>,
}

/// Extension point for report signature verification.
pub trait HardwareVerifier: Send + Sync {
    /// Returns `Ok(())` if the report signature is valid.
    fn verify_hardware_signature(&self, report: &AttestationReport) -> Result<()>;
}

/// Result of a successful attestation verification.
#[derive(Debug)]
pub struct VerifyResult {
    pub tee_type: TeeType,
    pub nonce_verified: bool,
    pub model_digest_verified: bool,
    pub measurement_verified: bool,
    pub hardware_verified: bool,
}

/// Parse the opaque report bytes returned across the boundary.
pub fn decode_report(bytes: &[u8]) -> Result<AttestationReport> {
    AttestationReport::from_bytes(bytes).map_err(|e| {
        EnclaveError::AttestationVerificationFailed(format!("cannot decode report: {e}"))
    })
}

/// Verify an attestation report against the provided options.
///
/// Returns the first failure encountered.
pub fn verify_report(report: &AttestationReport, opts: &VerifyOptions<'_>) -> Result<VerifyResult> {
    if report.tee_type == TeeType::Simulated && !opts.allow_simulated {
        return Err(EnclaveError::AttestationVerificationFailed(
            "report comes from a simulated TEE (pass allow_simulated to accept)".to_string(),
        ));
    }

    let mut result = VerifyResult {
        tee_type: report.tee_type,
        nonce_verified: false,
        model_digest_verified: false,
        measurement_verified: false,
        hardware_verified: false,
    };

    if let Some(ref nonce) = opts.nonce {
        verify_nonce_binding(&report.report_data, nonce)?;
        result.nonce_verified = true;
    }

    if let Some(ref digest) = opts.expected_model_digest {
        verify_model_digest_binding(&report.report_data, digest)?;
        result.model_digest_verified = true;
    }

    if let Some(ref expected) = opts.expected_measurement {
        verify_measurement(&report.measurement, expected)?;
        result.measurement_verified = true;
    }

    if let Some(verifier) = opts.hardware_verifier {
        verifier.verify_hardware_signature(report)?;
        result.hardware_verified = true;
    }

    Ok(result)
}

/// Verify that `report_data[0..32]` is the SHA-256 of `nonce`.
pub fn verify_nonce_binding(report_data: &[u8], nonce: &[u8]) -> Result<()> {
    check_report_data_len(report_data)?;
    let expected = Sha256::digest(nonce);
    if !constant_time_eq(&report_data[..32], expected.as_slice()) {
        return Err(EnclaveError::AttestationVerificationFailed(format!(
            "Nonce mismatch: report_data[0..32] = {}, expected SHA-256(nonce) = {}",
            hex::encode(&report_data[..32]),
            hex::encode(expected),
        )));
    }
    Ok(())
}

/// Verify that `report_data[32..64]` is the expected model digest.
pub fn verify_model_digest_binding(report_data: &[u8], digest: &[u8]) -> Result<()> {
    check_report_data_len(report_data)?;
    if digest.len() != 32 {
        return Err(EnclaveError::AttestationVerificationFailed(format!(
            "expected model digest must be 32 bytes, got {}",
            digest.len()
        )));
    }
    let bound = &report_data[32..REPORT_DATA_LEN];
    if !constant_time_eq(bound, digest) {
        let detail = if bound.iter().all(|&b| b == 0) {
            "report is not bound to any model".to_string()
        } else {
            format!("report_data[32..64] = {}", hex::encode(bound))
        };
        return Err(EnclaveError::AttestationVerificationFailed(format!(
            "Model digest mismatch: {detail}, expected {}",
            hex::encode(digest),
        )));
    }
    Ok(())
}

/// Verify that the platform measurement matches the expected value.
pub fn verify_measurement(measurement: &[u8], expected: &[u8]) -> Result<()> {
    if !constant_time_eq(measurement, expected) {
        return Err(EnclaveError::AttestationVerificationFailed(format!(
            "Measurement mismatch: got {}, expected {}",
            hex::encode(measurement),
            hex::encode(expected),
        )));
    }
    Ok(())
}

fn check_report_data_len(report_data: &[u8]) -> Result<()> {
    if report_data.len() != REPORT_DATA_LEN {
        return Err(EnclaveError::AttestationVerificationFailed(format!(
            "report_data must be {REPORT_DATA_LEN} bytes, got {}",
            report_data.len()
        )));
    }
    Ok(())
}

/// Constant-time byte slice comparison.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tee::attestation::ReportData;

    fn make_report(report_data: Vec<u8>, measurement: Vec<u8>) -> AttestationReport {
        AttestationReport {
            version: "1.0".to_string(),
            tee_type: TeeType::Simulated,
            report_data,
            measurement,
            raw_report: None,
            timestamp: chrono::Utc::now(),
            signature: None,
            signer_public_key: None,
        }
    }

    fn bound(nonce: &[u8], digest: Option<&[u8; 32]>) -> Vec<u8> {
        ReportData::bind(nonce, digest).as_bytes().to_vec()
    }

    #[test]
    fn test_nonce_binding_passes_when_matching() {
        let nonce = [0x01u8; 16];
        assert!(verify_nonce_binding(&bound(&nonce, None), &nonce).is_ok());
    }

    #[test]
    fn test_nonce_binding_fails_when_mismatch() {
        let err = verify_nonce_binding(&bound(&[0x01; 16], None), &[0x02; 16]).unwrap_err();
        assert!(err.to_string().contains("Nonce mismatch"));
    }

    #[test]
    fn test_nonce_binding_empty_nonce() {
        assert!(verify_nonce_binding(&bound(b"", None), b"").is_ok());
    }

    #[test]
    fn test_nonce_binding_rejects_short_report_data() {
        let err = verify_nonce_binding(&[0u8; 10], b"n").unwrap_err();
        assert!(err.to_string().contains("must be 64 bytes"));
    }

    #[test]
    fn test_model_digest_binding() {
        let digest = [0xBBu8; 32];
        let data = bound(b"n", Some(&digest));
        assert!(verify_model_digest_binding(&data, &digest).is_ok());
        let err = verify_model_digest_binding(&data, &[0xCC; 32]).unwrap_err();
        assert!(err.to_string().contains("Model digest mismatch"));
    }

    #[test]
    fn test_model_digest_binding_reports_unbound() {
        let err = verify_model_digest_binding(&bound(b"n", None), &[0xBB; 32]).unwrap_err();
        assert!(err.to_string().contains("not bound to any model"));
    }

    #[test]
    fn test_model_digest_must_be_32_bytes() {
        let err = verify_model_digest_binding(&bound(b"n", None), &[0; 16]).unwrap_err();
        assert!(err.to_string().contains("32 bytes"));
    }

    #[test]
    fn test_measurement_check() {
        let m = vec![0xCCu8; 48];
        assert!(verify_measurement(&m, &m).is_ok());
        let err = verify_measurement(&m, &[0xDD; 48]).unwrap_err();
        assert!(err.to_string().contains("Measurement mismatch"));
    }

    #[test]
    fn test_simulated_rejected_by_default() {
        let report = make_report(bound(b"n", None), vec![0; 48]);
        let err = verify_report(&report, &VerifyOptions::default()).unwrap_err();
        assert!(err.to_string().contains("simulated"));
    }

    #[test]
    fn test_verify_report_all_checks_pass() {
        let nonce = vec![0x01u8; 16];
        let digest = [0x02u8; 32];
        let measurement = vec![0x03u8; 48];
        let report = make_report(bound(&nonce, Some(&digest)), measurement.clone());

        let opts = VerifyOptions {
            nonce: Some(nonce),
            expected_model_digest: Some(digest.to_vec()),
            expected_measurement: Some(measurement),
            allow_simulated: true,
            hardware_verifier: None,
        };
        let result = verify_report(&report, &opts).unwrap();
        assert!(result.nonce_verified);
        assert!(result.model_digest_verified);
        assert!(result.measurement_verified);
        assert!(!result.hardware_verified);
        assert_eq!(result.tee_type, TeeType::Simulated);
    }

    #[test]
    fn test_verify_report_hardware_verifier_failure_propagates() {
        struct AlwaysFail;
        impl HardwareVerifier for AlwaysFail {
            fn verify_hardware_signature(&self, _report: &AttestationReport) -> Result<()> {
                Err(EnclaveError::AttestationVerificationFailed(
                    "signature invalid".to_string(),
                ))
            }
        }

        let report = make_report(bound(b"n", None), vec![0; 48]);
        let opts = VerifyOptions {
            allow_simulated: true,
            hardware_verifier: Some(&AlwaysFail),
            ..Default::default()
        };
        let err = verify_report(&report, &opts).unwrap_err();
        assert!(err.to_string().contains("signature invalid"));
    }

    #[test]
    fn test_decode_report_rejects_garbage() {
        let err = decode_report(b"not json").unwrap_err();
        assert!(matches!(err, EnclaveError::AttestationVerificationFailed(_)));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(constant_time_eq(b"", b""));
    }
}
