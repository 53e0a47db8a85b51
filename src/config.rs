use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dirs;
use crate::error::{EnclaveError, Result};
use crate::tee::key_provider::KeySource;

/// Settings for the trusted boundary and the host tooling around it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnclaveConfig {
    /// Deadline for the key-provisioning capability, in milliseconds.
    #[serde(default = "default_key_timeout_ms")]
    pub key_timeout_ms: u64,

    /// Deadline for the hardware attestation capability, in milliseconds.
    #[serde(default = "default_attestation_timeout_ms")]
    pub attestation_timeout_ms: u64,

    /// Hard cap on decrypted model size in bytes. `None` = no cap.
    #[serde(default)]
    pub max_model_bytes: Option<u64>,

    /// Reject models that would exceed the protected-memory budget.
    #[serde(default = "default_true")]
    pub enforce_epc_budget: bool,

    /// Embed the SHA-256 of the loaded weights in attestation user-data.
    #[serde(default = "default_true")]
    pub bind_model_digest: bool,

    /// Maximum accepted attestation nonce length.
    #[serde(default = "default_max_nonce_bytes")]
    pub max_nonce_bytes: usize,

    /// Output dimension of the inference kernel (1 = dot product).
    #[serde(default = "default_output_dim")]
    pub output_dim: usize,

    /// mlock decrypted weights so they are never swapped out.
    #[serde(default = "default_true")]
    pub lock_memory: bool,

    /// Where the static key provider reads the model key from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_source: Option<KeySource>,
}

fn default_key_timeout_ms() -> u64 {
    5_000
}

fn default_attestation_timeout_ms() -> u64 {
    10_000
}

fn default_max_nonce_bytes() -> usize {
    4096
}

fn default_output_dim() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl Default for EnclaveConfig {
    fn default() -> Self {
        Self {
            key_timeout_ms: default_key_timeout_ms(),
            attestation_timeout_ms: default_attestation_timeout_ms(),
            max_model_bytes: None,
            enforce_epc_budget: true,
            bind_model_digest: true,
            max_nonce_bytes: default_max_nonce_bytes(),
            output_dim: default_output_dim(),
            lock_memory: true,
            key_source: None,
        }
    }
}

impl EnclaveConfig {
    /// Load configuration from the default config file path.
    /// Returns default config if the file does not exist.
    pub fn load() -> Result<Self> {
        let path = dirs::config_path();
        let mut config = if path.exists() {
            Self::read_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit path. The file must exist.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::read_file(path.as_ref())?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EnclaveError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported variables:
    /// - `A3S_ENCLAVE_KEY_TIMEOUT_MS`
    /// - `A3S_ENCLAVE_ATTESTATION_TIMEOUT_MS`
    /// - `A3S_ENCLAVE_MAX_MODEL_BYTES`
    /// - `A3S_ENCLAVE_OUTPUT_DIM`
    /// - `A3S_ENCLAVE_BIND_MODEL_DIGEST` (`"0"`/`"false"` disables)
    /// - `A3S_ENCLAVE_KEY_FILE`: hex key file for the static key provider
    /// - `A3S_ENCLAVE_KEY_ENV`: name of an env var holding the hex key
    fn apply_env_overrides(&mut self) {
        if let Some(ms) = env_parse::<u64>("A3S_ENCLAVE_KEY_TIMEOUT_MS") {
            self.key_timeout_ms = ms;
        }
        if let Some(ms) = env_parse::<u64>("A3S_ENCLAVE_ATTESTATION_TIMEOUT_MS") {
            self.attestation_timeout_ms = ms;
        }
        if let Some(max) = env_parse::<u64>("A3S_ENCLAVE_MAX_MODEL_BYTES") {
            self.max_model_bytes = Some(max);
        }
        if let Some(dim) = env_parse::<usize>("A3S_ENCLAVE_OUTPUT_DIM") {
            self.output_dim = dim;
        }
        if let Ok(bind) = std::env::var("A3S_ENCLAVE_BIND_MODEL_DIGEST") {
            if bind == "0" || bind.eq_ignore_ascii_case("false") {
                self.bind_model_digest = false;
            } else if bind == "1" || bind.eq_ignore_ascii_case("true") {
                self.bind_model_digest = true;
            }
        }
        if let Ok(path) = std::env::var("A3S_ENCLAVE_KEY_FILE") {
            self.key_source = Some(KeySource::File(PathBuf::from(path)));
        } else if let Ok(var) = std::env::var("A3S_ENCLAVE_KEY_ENV") {
            self.key_source = Some(KeySource::Env(var));
        }
    }

    /// Reject settings the boundary cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.output_dim == 0 {
            return Err(EnclaveError::Config(
                "output_dim must be at least 1".to_string(),
            ));
        }
        if self.key_timeout_ms == 0 || self.attestation_timeout_ms == 0 {
            return Err(EnclaveError::Config(
                "capability timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Save the current configuration to the default config file path.
    pub fn save(&self) -> Result<()> {
        let path = dirs::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn key_timeout(&self) -> Duration {
        Duration::from_millis(self.key_timeout_ms)
    }

    pub fn attestation_timeout(&self) -> Duration {
        Duration::from_millis(self.attestation_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = EnclaveConfig::default();
        assert_eq!(config.key_timeout_ms, 5_000);
        assert_eq!(config.attestation_timeout_ms, 10_000);
        assert_eq!(config.output_dim, 1);
        assert!(config.bind_model_digest);
        assert!(config.max_model_bytes.is_none());
        assert!(config.key_source.is_none());
    }

    #[test]
    fn test_config_deserialize_partial() {
        let toml_str = r#"
            output_dim = 4
            max_model_bytes = 1048576
            bind_model_digest = false
        "#;
        let config: EnclaveConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.output_dim, 4);
        assert_eq!(config.max_model_bytes, Some(1_048_576));
        assert!(!config.bind_model_digest);
        // Unset fields fall back to defaults
        assert_eq!(config.key_timeout_ms, 5_000);
        assert!(config.lock_memory);
    }

    #[test]
    fn test_config_deserialize_key_source() {
        let toml_str = r#"
            [key_source]
            type = "file"
            value = "/etc/a3s/model.key"
        "#;
        let config: EnclaveConfig = toml::from_str(toml_str).unwrap();
        match config.key_source {
            Some(KeySource::File(p)) => assert_eq!(p, PathBuf::from("/etc/a3s/model.key")),
            other => panic!("unexpected key source: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_zero_output_dim() {
        let config = EnclaveConfig {
            output_dim: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("output_dim"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = EnclaveConfig {
            key_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeouts_as_durations() {
        let config = EnclaveConfig::default();
        assert_eq!(config.key_timeout(), Duration::from_secs(5));
        assert_eq!(config.attestation_timeout(), Duration::from_secs(10));
    }

    #[test]
    #[serial]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("A3S_ENCLAVE_HOME", dir.path());

        let config = EnclaveConfig {
            output_dim: 3,
            max_nonce_bytes: 64,
            key_source: Some(KeySource::Env("MODEL_KEY".to_string())),
            ..Default::default()
        };
        config.save().unwrap();

        let loaded = EnclaveConfig::load().unwrap();
        assert_eq!(loaded.output_dim, 3);
        assert_eq!(loaded.max_nonce_bytes, 64);
        assert!(matches!(loaded.key_source, Some(KeySource::Env(ref v)) if v == "MODEL_KEY"));

        std::env::remove_var("A3S_ENCLAVE_HOME");
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("A3S_ENCLAVE_HOME", dir.path());
        let config = EnclaveConfig::load().unwrap();
        assert_eq!(config.output_dim, 1);
        std::env::remove_var("A3S_ENCLAVE_HOME");
    }

    #[test]
    fn test_load_from_missing_path_fails() {
        let err = EnclaveConfig::load_from("/nonexistent/a3s/config.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("A3S_ENCLAVE_KEY_TIMEOUT_MS", "250");
        std::env::set_var("A3S_ENCLAVE_OUTPUT_DIM", "2");
        std::env::set_var("A3S_ENCLAVE_BIND_MODEL_DIGEST", "false");
        std::env::set_var("A3S_ENCLAVE_KEY_FILE", "/tmp/model.key");
        let mut config = EnclaveConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.key_timeout_ms, 250);
        assert_eq!(config.output_dim, 2);
        assert!(!config.bind_model_digest);
        assert!(matches!(config.key_source, Some(KeySource::File(_))));
        std::env::remove_var("A3S_ENCLAVE_KEY_TIMEOUT_MS");
        std::env::remove_var("A3S_ENCLAVE_OUTPUT_DIM");
        std::env::remove_var("A3S_ENCLAVE_BIND_MODEL_DIGEST");
        std::env::remove_var("A3S_ENCLAVE_KEY_FILE");
    }

    #[test]
    #[serial]
    fn test_env_invalid_values_ignored() {
        std::env::set_var("A3S_ENCLAVE_MAX_MODEL_BYTES", "lots");
        std::env::set_var("A3S_ENCLAVE_OUTPUT_DIM", "abc");
        let mut config = EnclaveConfig::default();
        config.apply_env_overrides();
        assert!(config.max_model_bytes.is_none());
        assert_eq!(config.output_dim, 1);
        std::env::remove_var("A3S_ENCLAVE_MAX_MODEL_BYTES");
        std::env::remove_var("A3S_ENCLAVE_OUTPUT_DIM");
    }
}
