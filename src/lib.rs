//! A3S Enclave: confidential model inference inside a trusted execution
//! boundary, with nonce-bound remote attestation.
//!
//! The host hands the boundary an encrypted model blob; the boundary obtains
//! the key from a provisioning capability, authenticates and decrypts the
//! blob, and keeps the weights private for the rest of its life. Callers can
//! run inference against the weights and ask for a hardware-signed report
//! that binds their nonce and the loaded model's digest.

pub mod cli;
pub mod config;
pub mod dirs;
pub mod enclave;
pub mod error;
pub mod tee;
pub mod verify;

/// Test utilities for integration tests. Not part of the public API.
#[doc(hidden)]
pub mod test_utils;

pub use enclave::{BoundaryState, Enclave};
pub use error::{EnclaveError, ErrorClass, Result};
