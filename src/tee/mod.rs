//! Platform capabilities consumed by the trusted boundary.
//!
//! - Hardware attestation (`attestation`): signs a measurement plus 64 bytes
//!   of user data. A simulated provider is included for development.
//! - Key provisioning (`key_provider`): supplies the AES-256 model key.
//! - Protected-memory budget (`epc`): bounds how large a model may be.

pub mod attestation;
pub mod epc;
pub mod key_provider;
