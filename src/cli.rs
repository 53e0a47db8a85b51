//! CLI argument parsing for a3s-enclave.
//!
//! Subcommands:
//!   keygen: Generate a random model key
//!   seal:   Encrypt weights into a model blob
//!   demo:   Create a boundary, load, infer, attest and terminate

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// A3S Enclave: confidential model inference with remote attestation.
#[derive(Parser, Debug)]
#[command(name = "a3s-enclave", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a fresh random 256-bit model key as hex
    Keygen(KeygenArgs),

    /// Encrypt model weights into the enclave blob format
    Seal(SealArgs),

    /// Run the full boundary lifecycle against the simulated TEE
    Demo(DemoArgs),
}

#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// Write the key to this file instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct SealArgs {
    /// Comma-separated model weights
    #[arg(long, value_delimiter = ',', required = true, allow_hyphen_values = true)]
    pub weights: Vec<f32>,

    /// Hex key file (64 hex chars)
    #[arg(long)]
    pub key_file: PathBuf,

    /// Output blob path
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Parser, Debug)]
pub struct DemoArgs {
    /// Encrypted model blob (default: seal the built-in 10-weight model)
    #[arg(long)]
    pub blob: Option<PathBuf>,

    /// Hex key file (default: the configured key source, else a random key)
    #[arg(long)]
    pub key_file: Option<PathBuf>,

    /// Comma-separated inference input (default: 1,2,...,10)
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub input: Option<Vec<f32>>,

    /// Attestation nonce, hex-encoded (default: 16 zero bytes)
    #[arg(long)]
    pub nonce: Option<String>,

    /// Report buffer capacity in bytes
    #[arg(long, default_value_t = 8192)]
    pub report_capacity: usize,

    /// Save the attestation report to this file
    #[arg(long)]
    pub report_out: Option<PathBuf>,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Weights of the built-in demo model.
pub fn demo_weights() -> Vec<f32> {
    vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]
}

/// Default demo input.
pub fn demo_input() -> Vec<f32> {
    (1..=10).map(|i| i as f32).collect()
}
