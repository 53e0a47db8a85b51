//! Filesystem locations used by the host-side tooling.

use std::path::PathBuf;

/// Base directory for enclave host files.
///
/// Uses `A3S_ENCLAVE_HOME` when set, otherwise `~/.a3s/enclave`.
pub fn enclave_home() -> PathBuf {
    if let Ok(home) = std::env::var("A3S_ENCLAVE_HOME") {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".a3s")
        .join("enclave")
}

/// Path to the TOML config file.
pub fn config_path() -> PathBuf {
    enclave_home().join("config.toml")
}
