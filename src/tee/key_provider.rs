use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use zeroize::{Zeroize, Zeroizing};

use crate::config::EnclaveConfig;
use crate::error::{EnclaveError, Result};

/// A 256-bit model key, wiped from memory on drop.
pub type ModelKey = Zeroizing<[u8; 32]>;

/// Source of the model decryption key.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "value")]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// Read key from a file (hex-encoded, 64 chars = 32 bytes).
    File(PathBuf),
    /// Read key from an environment variable (hex-encoded).
    Env(String),
}

/// Load a 32-byte AES-256 key from the configured source.
pub fn load_key(source: &KeySource) -> Result<ModelKey> {
    let mut hex_str = match source {
        KeySource::File(path) => std::fs::read_to_string(path).map_err(|e| {
            EnclaveError::KeyUnavailable(format!(
                "Failed to read key file {}: {e}",
                path.display()
            ))
        })?,
        KeySource::Env(var) => std::env::var(var)
            .map_err(|_| EnclaveError::KeyUnavailable(format!("Key env var '{var}' not set")))?,
    };

    let key = parse_hex_key(hex_str.trim());
    hex_str.zeroize();
    key
}

/// Decode a 64-char hex string into a key.
pub fn parse_hex_key(hex_str: &str) -> Result<ModelKey> {
    if hex_str.len() != 64 {
        return Err(EnclaveError::KeyUnavailable(format!(
            "Key must be 64 hex chars (32 bytes), got {} chars",
            hex_str.len()
        )));
    }
    let mut key = Zeroizing::new([0u8; 32]);
    hex::decode_to_slice(hex_str, &mut key[..])
        .map_err(|e| EnclaveError::KeyUnavailable(format!("Invalid hex in key: {e}")))?;
    Ok(key)
}

/// The key-provisioning capability (`ObtainModelKey`).
///
/// Implementations wrap whatever sealing or KMS infrastructure supplies the
/// symmetric key used to decrypt model blobs. Any failure is reported as
/// [`EnclaveError::KeyUnavailable`].
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Fetch the current decryption key.
    async fn get_key(&self) -> Result<ModelKey>;

    /// Provider name for diagnostics.
    fn provider_name(&self) -> &str;
}

/// Loads the key once from a [`KeySource`] and caches it.
pub struct StaticKeyProvider {
    source: KeySource,
    cached: tokio::sync::OnceCell<ModelKey>,
}

impl StaticKeyProvider {
    pub fn new(source: KeySource) -> Self {
        Self {
            source,
            cached: tokio::sync::OnceCell::new(),
        }
    }
}

#[async_trait]
impl KeyProvider for StaticKeyProvider {
    async fn get_key(&self) -> Result<ModelKey> {
        let key = self
            .cached
            .get_or_try_init(|| async { load_key(&self.source) })
            .await?;
        Ok(key.clone())
    }

    fn provider_name(&self) -> &str {
        "static"
    }
}

/// Holds a key handed over in-process by the provisioning layer.
pub struct MemoryKeyProvider {
    key: ModelKey,
}

impl MemoryKeyProvider {
    pub fn new(key: [u8; 32]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }
}

#[async_trait]
impl KeyProvider for MemoryKeyProvider {
    async fn get_key(&self) -> Result<ModelKey> {
        Ok(self.key.clone())
    }

    fn provider_name(&self) -> &str {
        "memory"
    }
}

/// Build a `KeyProvider` from config.
///
/// Returns `None` if no key source is configured.
pub fn from_config(config: &EnclaveConfig) -> Option<Arc<dyn KeyProvider>> {
    let source = config.key_source.as_ref()?;
    tracing::info!("Static key provider initialized");
    Some(Arc::new(StaticKeyProvider::new(source.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn write_hex_key(path: &std::path::Path, byte: u8) {
        std::fs::write(path, hex::encode([byte; 32])).unwrap();
    }

    #[tokio::test]
    async fn test_static_provider_loads_key_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("model.key");
        write_hex_key(&key_path, 0x42);
        let provider = StaticKeyProvider::new(KeySource::File(key_path));
        let key = provider.get_key().await.unwrap();
        assert_eq!(*key, [0x42u8; 32]);
    }

    #[tokio::test]
    async fn test_static_provider_caches_key() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("model.key");
        write_hex_key(&key_path, 0x42);
        let provider = StaticKeyProvider::new(KeySource::File(key_path.clone()));

        let key1 = provider.get_key().await.unwrap();
        write_hex_key(&key_path, 0x99);
        let key2 = provider.get_key().await.unwrap();
        assert_eq!(*key1, *key2);
    }

    #[tokio::test]
    async fn test_static_provider_missing_file_is_key_unavailable() {
        let provider = StaticKeyProvider::new(KeySource::File(PathBuf::from(
            "/nonexistent/model.key",
        )));
        let err = provider.get_key().await.unwrap_err();
        assert!(matches!(err, EnclaveError::KeyUnavailable(_)));
    }

    #[tokio::test]
    async fn test_memory_provider_returns_key() {
        let provider = MemoryKeyProvider::new([7u8; 32]);
        assert_eq!(*provider.get_key().await.unwrap(), [7u8; 32]);
        assert_eq!(provider.provider_name(), "memory");
    }

    #[test]
    fn test_load_key_with_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("model.key");
        std::fs::write(&key_path, format!("{}\n", hex::encode([0x11u8; 32]))).unwrap();
        let key = load_key(&KeySource::File(key_path)).unwrap();
        assert_eq!(*key, [0x11u8; 32]);
    }

    #[test]
    #[serial]
    fn test_load_key_from_env() {
        std::env::set_var("TEST_A3S_ENCLAVE_KEY", hex::encode([0x5Au8; 32]));
        let key = load_key(&KeySource::Env("TEST_A3S_ENCLAVE_KEY".to_string())).unwrap();
        assert_eq!(*key, [0x5Au8; 32]);
        std::env::remove_var("TEST_A3S_ENCLAVE_KEY");
    }

    #[test]
    #[serial]
    fn test_load_key_missing_env() {
        std::env::remove_var("NONEXISTENT_ENCLAVE_KEY_VAR");
        let err = load_key(&KeySource::Env("NONEXISTENT_ENCLAVE_KEY_VAR".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("not set"));
    }

    #[test]
    fn test_parse_hex_key_wrong_length() {
        let err = parse_hex_key("abcdef").unwrap_err();
        assert!(err.to_string().contains("64 hex chars"));
    }

    #[test]
    fn test_parse_hex_key_invalid_hex() {
        let err = parse_hex_key(&"z".repeat(64)).unwrap_err();
        assert!(err.to_string().contains("Invalid hex"));
    }

    #[test]
    fn test_key_source_serde_roundtrip() {
        let source = KeySource::File(PathBuf::from("/tmp/key.hex"));
        let json = serde_json::to_string(&source).unwrap();
        assert!(json.contains("\"type\":\"file\""));
        let parsed: KeySource = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, KeySource::File(p) if p == PathBuf::from("/tmp/key.hex")));
    }

    #[test]
    fn test_from_config_without_source() {
        assert!(from_config(&EnclaveConfig::default()).is_none());
    }

    #[test]
    fn test_from_config_with_source() {
        let config = EnclaveConfig {
            key_source: Some(KeySource::Env("X".to_string())),
            ..Default::default()
        };
        let provider = from_config(&config).unwrap();
        assert_eq!(provider.provider_name(), "static");
    }
}
