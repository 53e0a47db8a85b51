//! TEE attestation: the hardware report capability and the report format.

use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384};

use crate::error::{EnclaveError, Result};

/// Width of the user-data field in a hardware report.
pub const REPORT_DATA_LEN: usize = 64;

/// Type of TEE hardware that produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeeType {
    /// Intel Software Guard Extensions.
    Sgx,
    /// AMD Secure Encrypted Virtualization - Secure Nested Paging.
    SevSnp,
    /// Intel Trust Domain Extensions.
    Tdx,
    /// Simulated TEE for development.
    Simulated,
}

impl std::fmt::Display for TeeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeeType::Sgx => write!(f, "sgx"),
            TeeType::SevSnp => write!(f, "sev-snp"),
            TeeType::Tdx => write!(f, "tdx"),
            TeeType::Simulated => write!(f, "simulated"),
        }
    }
}

/// The 64 bytes of caller-derived data bound into a hardware report.
///
/// Layout: `[SHA-256(nonce) (32 bytes)][model digest (32 bytes, zero if unbound)]`
///
/// The nonce is hashed rather than copied so nonces of any length are bound
/// in full and their contents are never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportData([u8; REPORT_DATA_LEN]);

impl ReportData {
    pub fn bind(nonce: &[u8], model_digest: Option<&[u8; 32]>) -> Self {
        let mut data = [0u8; REPORT_DATA_LEN];
        data[..32].copy_from_slice(&Sha256::digest(nonce));
        if let Some(digest) = model_digest {
            data[32..].copy_from_slice(digest);
        }
        Self(data)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let data: [u8; REPORT_DATA_LEN] = bytes.try_into().map_err(|_| {
            EnclaveError::AttestationVerificationFailed(format!(
                "report_data must be {REPORT_DATA_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(data))
    }

    pub fn as_bytes(&self) -> &[u8; REPORT_DATA_LEN] {
        &self.0
    }

    pub fn nonce_hash(&self) -> &[u8] {
        &self.0[..32]
    }

    pub fn model_digest(&self) -> &[u8] {
        &self.0[32..]
    }
}

/// Remote attestation report produced by the hardware capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationReport {
    /// Report format version (current: "1.0").
    #[serde(default = "default_report_version")]
    pub version: String,
    pub tee_type: TeeType,
    /// User data echoed by the hardware (see [`ReportData`]).
    #[serde(with = "hex_bytes")]
    pub report_data: Vec<u8>,
    /// Platform/enclave measurement (launch digest).
    #[serde(with = "hex_bytes")]
    pub measurement: Vec<u8>,
    /// Full raw report from firmware, when the platform provides one.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "hex_bytes_opt"
    )]
    pub raw_report: Option<Vec<u8>>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Signature over [`AttestationReport::signed_payload`].
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "hex_bytes_opt"
    )]
    pub signature: Option<Vec<u8>>,
    /// Public key that verifies `signature`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "hex_bytes_opt"
    )]
    pub signer_public_key: Option<Vec<u8>>,
}

fn default_report_version() -> String {
    "1.0".to_string()
}

impl AttestationReport {
    /// Bytes covered by the report signature.
    pub fn signed_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(
            self.version.len() + self.report_data.len() + self.measurement.len() + 48,
        );
        payload.extend_from_slice(self.version.as_bytes());
        payload.push(0);
        payload.extend_from_slice(self.tee_type.to_string().as_bytes());
        payload.push(0);
        payload.extend_from_slice(&self.report_data);
        payload.extend_from_slice(&self.measurement);
        payload.extend_from_slice(self.timestamp.to_rfc3339().as_bytes());
        payload
    }

    /// Serialize to the opaque byte form returned across the boundary.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse the opaque byte form returned by `GenerateAttestation`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// The hardware attestation capability (`GenerateHardwareReport`).
///
/// Implementations sign the platform measurement together with `user_data`.
/// The signing key and measurement logic belong to the platform.
#[async_trait::async_trait]
pub trait TeeProvider: Send + Sync {
    async fn hardware_report(&self, user_data: &ReportData) -> Result<AttestationReport>;

    /// The type of TEE hardware behind this provider.
    fn tee_type(&self) -> TeeType;
}

/// Development provider that signs reports with an in-memory Ed25519 key.
///
/// The measurement is derived from the crate version so every build of the
/// same version reports the same value.
pub struct SimulatedTeeProvider {
    signing_key: SigningKey,
    measurement: Vec<u8>,
}

impl SimulatedTeeProvider {
    pub fn new() -> Self {
        Self::with_signing_key(SigningKey::generate(&mut rand::rngs::OsRng))
    }

    pub fn with_signing_key(signing_key: SigningKey) -> Self {
        let measurement =
            Sha384::digest(concat!("a3s-enclave/", env!("CARGO_PKG_VERSION")).as_bytes())
                .to_vec();
        tracing::info!(
            measurement = %hex::encode(&measurement),
            "Simulated TEE provider initialized"
        );
        Self {
            signing_key,
            measurement,
        }
    }

    pub fn measurement(&self) -> &[u8] {
        &self.measurement
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }
}

impl Default for SimulatedTeeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TeeProvider for SimulatedTeeProvider {
    async fn hardware_report(&self, user_data: &ReportData) -> Result<AttestationReport> {
        let mut report = AttestationReport {
            version: default_report_version(),
            tee_type: TeeType::Simulated,
            report_data: user_data.as_bytes().to_vec(),
            measurement: self.measurement.clone(),
            raw_report: None,
            timestamp: chrono::Utc::now(),
            signature: None,
            signer_public_key: Some(self.public_key().to_vec()),
        };
        let signature = self.signing_key.sign(&report.signed_payload());
        report.signature = Some(signature.to_bytes().to_vec());
        Ok(report)
    }

    fn tee_type(&self) -> TeeType {
        TeeType::Simulated
    }
}

/// Hex serialization for byte vectors in attestation reports.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let hex_str = String::deserialize(d)?;
        hex::decode(hex_str).map_err(serde::de::Error::custom)
    }
}

/// Hex serialization for optional byte vectors in attestation reports.
mod hex_bytes_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_str(&hex::encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|h| hex::decode(h).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    #[test]
    fn test_tee_type_display() {
        assert_eq!(TeeType::Sgx.to_string(), "sgx");
        assert_eq!(TeeType::SevSnp.to_string(), "sev-snp");
        assert_eq!(TeeType::Tdx.to_string(), "tdx");
        assert_eq!(TeeType::Simulated.to_string(), "simulated");
    }

    #[test]
    fn test_tee_type_serde() {
        let json = serde_json::to_string(&TeeType::SevSnp).unwrap();
        assert_eq!(json, "\"sev-snp\"");
        let parsed: TeeType = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, TeeType::SevSnp);
    }

    #[test]
    fn test_report_data_layout() {
        let digest = [0xCDu8; 32];
        let data = ReportData::bind(b"nonce", Some(&digest));
        assert_eq!(data.nonce_hash(), Sha256::digest(b"nonce").as_slice());
        assert_eq!(data.model_digest(), &digest);
    }

    #[test]
    fn test_report_data_without_model_is_zero_padded() {
        let data = ReportData::bind(b"nonce", None);
        assert!(data.model_digest().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_report_data_binds_long_nonce_fully() {
        // Nonces that share a 64-byte prefix must still bind differently.
        let mut a = vec![0x11u8; 100];
        let b = a.clone();
        a[99] = 0x12;
        assert_ne!(ReportData::bind(&a, None), ReportData::bind(&b, None));
    }

    #[test]
    fn test_report_data_from_bytes_rejects_wrong_length() {
        assert!(ReportData::from_bytes(&[0u8; 10]).is_err());
        assert!(ReportData::from_bytes(&[0u8; 64]).is_ok());
    }

    #[tokio::test]
    async fn test_simulated_report_echoes_user_data() {
        let provider = SimulatedTeeProvider::new();
        let user_data = ReportData::bind(b"abc", None);
        let report = provider.hardware_report(&user_data).await.unwrap();
        assert_eq!(report.tee_type, TeeType::Simulated);
        assert_eq!(report.report_data, user_data.as_bytes().to_vec());
        assert_eq!(report.measurement.len(), 48);
        assert_eq!(report.measurement, provider.measurement());
    }

    #[tokio::test]
    async fn test_simulated_report_signature_verifies() {
        let provider = SimulatedTeeProvider::new();
        let report = provider
            .hardware_report(&ReportData::bind(b"n", None))
            .await
            .unwrap();

        let key_bytes: [u8; 32] = report
            .signer_public_key
            .clone()
            .unwrap()
            .try_into()
            .unwrap();
        let key = VerifyingKey::from_bytes(&key_bytes).unwrap();
        let sig_bytes: [u8; 64] = report.signature.clone().unwrap().try_into().unwrap();
        let sig = Signature::from_bytes(&sig_bytes);
        assert!(key.verify(&report.signed_payload(), &sig).is_ok());
    }

    #[tokio::test]
    async fn test_report_bytes_roundtrip_preserves_signature_payload() {
        let provider = SimulatedTeeProvider::new();
        let report = provider
            .hardware_report(&ReportData::bind(b"n", Some(&[1u8; 32])))
            .await
            .unwrap();
        let bytes = report.to_bytes().unwrap();
        let parsed = AttestationReport::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.report_data, report.report_data);
        assert_eq!(parsed.signed_payload(), report.signed_payload());
    }

    #[test]
    fn test_report_version_default_on_deserialize() {
        let json = r#"{"tee_type":"simulated","report_data":"aabb","measurement":"ccdd","timestamp":"2024-01-01T00:00:00Z"}"#;
        let report: AttestationReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.version, "1.0");
        assert!(report.signature.is_none());
    }

    #[test]
    fn test_invalid_hex_field_rejected() {
        let json = r#"{"tee_type":"simulated","report_data":"zz","measurement":"ccdd","timestamp":"2024-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<AttestationReport>(json).is_err());
    }

    #[test]
    fn test_optional_fields_omitted_when_none() {
        let report = AttestationReport {
            version: "1.0".to_string(),
            tee_type: TeeType::Sgx,
            report_data: vec![0; 64],
            measurement: vec![0; 32],
            raw_report: None,
            timestamp: chrono::Utc::now(),
            signature: None,
            signer_public_key: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("raw_report"));
        assert!(!json.contains("signature"));
    }
}
