use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::error::{EnclaveError, Result};
use crate::tee::attestation::{AttestationReport, ReportData, TeeProvider, TeeType};
use crate::tee::key_provider::{KeyProvider, ModelKey};

/// Fixed key used by tests that don't care about key material.
pub const TEST_KEY: [u8; 32] = [0x42; 32];

#[derive(Debug, Clone, Copy)]
enum KeyBehavior {
    Succeed,
    Fail,
    Hang,
}

/// A scripted key capability.
pub struct MockKeyProvider {
    key: [u8; 32],
    behavior: KeyBehavior,
    /// Number of `get_key` calls (for test verification).
    pub calls: Arc<AtomicU32>,
}

impl MockKeyProvider {
    /// Returns `key` on every call.
    pub fn with_key(key: [u8; 32]) -> Self {
        Self {
            key,
            behavior: KeyBehavior::Succeed,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Returns [`TEST_KEY`] on every call.
    pub fn success() -> Self {
        Self::with_key(TEST_KEY)
    }

    /// Fails every call with `KeyUnavailable`.
    pub fn failing() -> Self {
        Self {
            behavior: KeyBehavior::Fail,
            ..Self::success()
        }
    }

    /// Never returns.
    pub fn hanging() -> Self {
        Self {
            behavior: KeyBehavior::Hang,
            ..Self::success()
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyProvider for MockKeyProvider {
    async fn get_key(&self) -> Result<ModelKey> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            KeyBehavior::Succeed => Ok(Zeroizing::new(self.key)),
            KeyBehavior::Fail => Err(EnclaveError::KeyUnavailable(
                "mock key service unavailable".to_string(),
            )),
            KeyBehavior::Hang => std::future::pending().await,
        }
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

#[derive(Debug, Clone, Copy)]
enum ReportBehavior {
    Echo,
    Fail,
    Hang,
    WrongEcho,
    Oversized(usize),
}

/// A scripted hardware attestation capability.
///
/// Reports are unsigned and carry a fixed 48-byte measurement.
pub struct MockTeeProvider {
    behavior: ReportBehavior,
    delay: Option<Duration>,
    /// Number of `hardware_report` calls (for test verification).
    pub calls: Arc<AtomicU32>,
    last_user_data: Mutex<Option<ReportData>>,
}

impl MockTeeProvider {
    fn with_behavior(behavior: ReportBehavior) -> Self {
        Self {
            behavior,
            delay: None,
            calls: Arc::new(AtomicU32::new(0)),
            last_user_data: Mutex::new(None),
        }
    }

    /// Echoes the user data back in a well-formed report.
    pub fn echo() -> Self {
        Self::with_behavior(ReportBehavior::Echo)
    }

    /// Fails every call with `AttestationFailed`.
    pub fn failing() -> Self {
        Self::with_behavior(ReportBehavior::Fail)
    }

    /// Never returns.
    pub fn hanging() -> Self {
        Self::with_behavior(ReportBehavior::Hang)
    }

    /// Returns a report whose user data differs from what was requested.
    pub fn wrong_echo() -> Self {
        Self::with_behavior(ReportBehavior::WrongEcho)
    }

    /// Echoes correctly but attaches a `raw_report` of `len` bytes.
    pub fn oversized(len: usize) -> Self {
        Self::with_behavior(ReportBehavior::Oversized(len))
    }

    /// Sleep for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn measurement() -> Vec<u8> {
        vec![0x5A; 48]
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// User data passed on the most recent call.
    pub fn last_user_data(&self) -> Option<ReportData> {
        *self
            .last_user_data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TeeProvider for MockTeeProvider {
    async fn hardware_report(&self, user_data: &ReportData) -> Result<AttestationReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_user_data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(*user_data);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut report = AttestationReport {
            version: "1.0".to_string(),
            tee_type: TeeType::Simulated,
            report_data: user_data.as_bytes().to_vec(),
            measurement: Self::measurement(),
            raw_report: None,
            timestamp: chrono::Utc::now(),
            signature: None,
            signer_public_key: None,
        };

        match self.behavior {
            ReportBehavior::Echo => {}
            ReportBehavior::Fail => {
                return Err(EnclaveError::AttestationFailed(
                    "mock hardware refused to sign".to_string(),
                ))
            }
            ReportBehavior::Hang => return std::future::pending().await,
            ReportBehavior::WrongEcho => report.report_data = vec![0xFF; 64],
            ReportBehavior::Oversized(len) => report.raw_report = Some(vec![0xAB; len]),
        }
        Ok(report)
    }

    fn tee_type(&self) -> TeeType {
        TeeType::Simulated
    }
}
