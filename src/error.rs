use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum EnclaveError {
    #[error("Model decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Malformed model: {0}")]
    MalformedModel(String),

    #[error("Model key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    #[error("No model loaded")]
    ModelNotLoaded,

    #[error("Insufficient output capacity: need {required} values, caller provided {capacity}")]
    InsufficientOutputCapacity { required: usize, capacity: usize },

    #[error("Attestation report too large: {required} bytes, caller provided {capacity}")]
    ReportTooLarge { required: usize, capacity: usize },

    #[error("Attestation failed: {0}")]
    AttestationFailed(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Enclave has been terminated")]
    Terminated,

    #[error("Weight index {index} out of range (model has {count} weights)")]
    OutOfRange { index: usize, count: usize },

    #[error("Attestation verification failed: {0}")]
    AttestationVerificationFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, EnclaveError>;

/// Failure taxonomy for errors crossing the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed sizes or buffers supplied by the caller. State unchanged.
    InputContract,
    /// Key or attestation capability failed or timed out. State unchanged.
    Capability,
    /// Authenticated decryption rejected the blob. State unchanged.
    Integrity,
    /// Operation not valid in the current state (e.g. no model loaded).
    Invariant,
    /// Memory could not be reserved for the model. Previous model intact.
    Resource,
    /// The boundary has been torn down.
    Lifecycle,
    /// Host-side failures: config files, IO, serialization.
    Host,
}

impl EnclaveError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EnclaveError::MalformedModel(_)
            | EnclaveError::InsufficientOutputCapacity { .. }
            | EnclaveError::ReportTooLarge { .. }
            | EnclaveError::InvalidArgument(_)
            | EnclaveError::OutOfRange { .. } => ErrorClass::InputContract,
            EnclaveError::KeyUnavailable(_)
            | EnclaveError::AttestationFailed(_)
            | EnclaveError::Timeout { .. } => ErrorClass::Capability,
            EnclaveError::DecryptionFailed(_) | EnclaveError::AttestationVerificationFailed(_) => {
                ErrorClass::Integrity
            }
            EnclaveError::ModelNotLoaded => ErrorClass::Invariant,
            EnclaveError::AllocationFailed(_) => ErrorClass::Resource,
            EnclaveError::Terminated => ErrorClass::Lifecycle,
            EnclaveError::Config(_)
            | EnclaveError::Io(_)
            | EnclaveError::Serialization(_)
            | EnclaveError::TomlDe(_)
            | EnclaveError::TomlSer(_) => ErrorClass::Host,
        }
    }

    /// Stable failure signal returned to the host across the boundary.
    pub fn code(&self) -> &'static str {
        match self {
            EnclaveError::DecryptionFailed(_) => "decryption_failed",
            EnclaveError::MalformedModel(_) => "malformed_model",
            EnclaveError::KeyUnavailable(_) => "key_unavailable",
            EnclaveError::AllocationFailed(_) => "allocation_failed",
            EnclaveError::ModelNotLoaded => "model_not_loaded",
            EnclaveError::InsufficientOutputCapacity { .. } => "insufficient_output_capacity",
            EnclaveError::ReportTooLarge { .. } => "report_too_large",
            EnclaveError::AttestationFailed(_) => "attestation_failed",
            EnclaveError::Timeout { .. } => "timeout",
            EnclaveError::InvalidArgument(_) => "invalid_argument",
            EnclaveError::Terminated => "terminated",
            EnclaveError::OutOfRange { .. } => "out_of_range",
            EnclaveError::AttestationVerificationFailed(_) => "verification_failed",
            EnclaveError::Config(_) => "config_error",
            EnclaveError::Io(_) => "io_error",
            EnclaveError::Serialization(_) => "serialization_error",
            EnclaveError::TomlDe(_) | EnclaveError::TomlSer(_) => "toml_error",
        }
    }

    /// Whether the caller may retry the same call (possibly with corrected
    /// arguments) and expect it to succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::InputContract | ErrorClass::Capability | ErrorClass::Invariant
        )
    }
}
