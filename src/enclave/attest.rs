//! Attestation Generator: binds a caller nonce (and the loaded model's
//! digest) into a hardware report and polices the caller's buffer size.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{EnclaveError, Result};
use crate::tee::attestation::{AttestationReport, ReportData, TeeProvider, TeeType};

pub struct AttestationGenerator {
    provider: Arc<dyn TeeProvider>,
    timeout: Duration,
    bind_model_digest: bool,
}

impl AttestationGenerator {
    pub fn new(provider: Arc<dyn TeeProvider>, timeout: Duration, bind_model_digest: bool) -> Self {
        Self {
            provider,
            timeout,
            bind_model_digest,
        }
    }

    pub fn tee_type(&self) -> TeeType {
        self.provider.tee_type()
    }

    /// User-data that a report for `nonce` will carry.
    pub fn user_data(&self, nonce: &[u8], model_digest: Option<&[u8; 32]>) -> ReportData {
        let digest = if self.bind_model_digest {
            model_digest
        } else {
            None
        };
        ReportData::bind(nonce, digest)
    }

    /// Ask the hardware capability for a report over `nonce` and the model digest.
    pub async fn report(
        &self,
        nonce: &[u8],
        model_digest: Option<&[u8; 32]>,
    ) -> Result<AttestationReport> {
        let user_data = self.user_data(nonce, model_digest);

        let report = match tokio::time::timeout(
            self.timeout,
            self.provider.hardware_report(&user_data),
        )
        .await
        {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                return Err(match e {
                    EnclaveError::AttestationFailed(_) => e,
                    other => EnclaveError::AttestationFailed(other.to_string()),
                })
            }
            Err(_) => {
                return Err(EnclaveError::Timeout {
                    operation: "GenerateHardwareReport",
                    after: self.timeout,
                })
            }
        };

        if report.report_data.as_slice() != user_data.as_bytes() {
            return Err(EnclaveError::AttestationFailed(
                "hardware report does not carry the requested user data".to_string(),
            ));
        }
        Ok(report)
    }

    /// Produce a report and copy its serialized form into `out`.
    ///
    /// Returns the exact report length. If the report does not fit, `out`
    /// is left untouched and `ReportTooLarge` carries the required size.
    pub async fn generate(
        &self,
        nonce: &[u8],
        model_digest: Option<&[u8; 32]>,
        out: &mut [u8],
    ) -> Result<usize> {
        let report = self.report(nonce, model_digest).await?;
        let bytes = report
            .to_bytes()
            .map_err(|e| EnclaveError::AttestationFailed(format!("cannot encode report: {e}")))?;

        if bytes.len() > out.len() {
            return Err(EnclaveError::ReportTooLarge {
                required: bytes.len(),
                capacity: out.len(),
            });
        }
        out[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }
}

impl std::fmt::Debug for AttestationGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationGenerator")
            .field("tee_type", &self.provider.tee_type())
            .field("timeout", &self.timeout)
            .field("bind_model_digest", &self.bind_model_digest)
            .finish()
    }
}
