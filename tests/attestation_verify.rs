//! Integration tests for client-side verification of reports produced by
//! the boundary.

use std::sync::Arc;

use a3s_enclave::config::EnclaveConfig;
use a3s_enclave::enclave::loader::{seal_weights, weights_digest};
use a3s_enclave::tee::attestation::SimulatedTeeProvider;
use a3s_enclave::test_utils::{MockKeyProvider, TEST_KEY};
use a3s_enclave::verify::{decode_report, verify_report, Ed25519ReportVerifier, VerifyOptions};
use a3s_enclave::{Enclave, EnclaveError};

fn weights() -> Vec<f32> {
    vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]
}

async fn setup(bind_model_digest: bool) -> (Enclave, Arc<SimulatedTeeProvider>) {
    let tee = Arc::new(SimulatedTeeProvider::new());
    let config = EnclaveConfig {
        enforce_epc_budget: false,
        lock_memory: false,
        bind_model_digest,
        ..Default::default()
    };
    let enclave =
        Enclave::create(config, Arc::new(MockKeyProvider::success()), tee.clone()).unwrap();
    let blob = seal_weights(&weights(), &TEST_KEY).unwrap();
    enclave.load_model(&blob, blob.len()).await.unwrap();
    (enclave, tee)
}

async fn report_bytes(enclave: &Enclave, nonce: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 8192];
    let len = enclave
        .generate_attestation(nonce, nonce.len(), &mut buf)
        .await
        .unwrap();
    buf.truncate(len);
    buf
}

#[tokio::test]
async fn test_full_verification_passes() {
    let (enclave, tee) = setup(true).await;
    let nonce = b"client-nonce-0001".to_vec();
    let report = decode_report(&report_bytes(&enclave, &nonce).await).unwrap();

    let verifier = Ed25519ReportVerifier::pinned(tee.public_key());
    let opts = VerifyOptions {
        nonce: Some(nonce),
        expected_model_digest: Some(weights_digest(&weights()).to_vec()),
        expected_measurement: Some(tee.measurement().to_vec()),
        allow_simulated: true,
        hardware_verifier: Some(&verifier),
    };
    let result = verify_report(&report, &opts).unwrap();
    assert!(result.nonce_verified);
    assert!(result.model_digest_verified);
    assert!(result.measurement_verified);
    assert!(result.hardware_verified);
}

#[tokio::test]
async fn test_enclave_digest_matches_host_computed_digest() {
    let (enclave, _tee) = setup(true).await;
    assert_eq!(
        enclave.model_digest().await,
        Some(weights_digest(&weights()))
    );
}

#[tokio::test]
async fn test_replayed_report_fails_nonce_check() {
    let (enclave, _tee) = setup(true).await;
    let stale = decode_report(&report_bytes(&enclave, b"old-nonce").await).unwrap();
    let opts = VerifyOptions {
        nonce: Some(b"new-nonce".to_vec()),
        allow_simulated: true,
        ..Default::default()
    };
    let err = verify_report(&stale, &opts).unwrap_err();
    assert!(matches!(err, EnclaveError::AttestationVerificationFailed(_)));
    assert!(err.to_string().contains("Nonce mismatch"));
}

#[tokio::test]
async fn test_other_model_fails_digest_check() {
    let (enclave, _tee) = setup(true).await;
    let report = decode_report(&report_bytes(&enclave, b"n").await).unwrap();
    let opts = VerifyOptions {
        expected_model_digest: Some(weights_digest(&[1.0; 10]).to_vec()),
        allow_simulated: true,
        ..Default::default()
    };
    assert!(verify_report(&report, &opts).is_err());
}

#[tokio::test]
async fn test_unbound_report_fails_digest_check() {
    let (enclave, _tee) = setup(false).await;
    let report = decode_report(&report_bytes(&enclave, b"n").await).unwrap();
    let opts = VerifyOptions {
        expected_model_digest: Some(weights_digest(&weights()).to_vec()),
        allow_simulated: true,
        ..Default::default()
    };
    let err = verify_report(&report, &opts).unwrap_err();
    assert!(err.to_string().contains("not bound to any model"));
}

#[tokio::test]
async fn test_tampered_report_fails_signature_check() {
    let (enclave, tee) = setup(true).await;
    let mut report = decode_report(&report_bytes(&enclave, b"n").await).unwrap();
    report.report_data[40] ^= 0xFF;

    let verifier = Ed25519ReportVerifier::pinned(tee.public_key());
    let opts = VerifyOptions {
        allow_simulated: true,
        hardware_verifier: Some(&verifier),
        ..Default::default()
    };
    assert!(verify_report(&report, &opts).is_err());
}

#[tokio::test]
async fn test_simulated_report_needs_explicit_opt_in() {
    let (enclave, _tee) = setup(true).await;
    let report = decode_report(&report_bytes(&enclave, b"n").await).unwrap();
    let err = verify_report(&report, &VerifyOptions::default()).unwrap_err();
    assert!(err.to_string().contains("simulated"));
}
