//! a3s-enclave-verify: verify a saved attestation report offline.
//!
//! Checks nonce binding, model digest binding, platform measurement and,
//! for simulated reports, the Ed25519 signature.
//!
//! # Usage
//!
//! ```text
//! a3s-enclave-verify --file report.json \
//!     --nonce 00000000000000000000000000000000 \
//!     --model-digest <sha256-hex> \
//!     --allow-simulated
//! ```

use std::path::PathBuf;
use std::process;

use clap::Parser;

use a3s_enclave::tee::attestation::TeeType;
use a3s_enclave::verify::{decode_report, verify_report, Ed25519ReportVerifier, VerifyOptions};

/// Verify an a3s-enclave attestation report.
#[derive(Parser, Debug)]
#[command(name = "a3s-enclave-verify", version, about, long_about = None)]
struct Args {
    /// Report file written by `a3s-enclave demo --report-out`
    #[arg(long)]
    file: PathBuf,

    /// Nonce sent with the attestation request (hex)
    #[arg(long)]
    nonce: Option<String>,

    /// Expected SHA-256 of the model weights (hex, 32 bytes)
    #[arg(long)]
    model_digest: Option<String>,

    /// Expected platform measurement (hex)
    #[arg(long)]
    expected_measurement: Option<String>,

    /// Expected signer public key for simulated reports (hex, 32 bytes)
    #[arg(long)]
    signer_key: Option<String>,

    /// Accept reports produced by the simulated TEE
    #[arg(long)]
    allow_simulated: bool,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn decode_hex(value: Option<&str>, flag: &str) -> anyhow::Result<Option<Vec<u8>>> {
    value
        .map(hex::decode)
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid {flag} hex: {e}"))
}

fn run(args: Args) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.file)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", args.file.display()))?;
    let report = decode_report(&bytes)?;

    let signer_key = decode_hex(args.signer_key.as_deref(), "--signer-key")?
        .map(|k| {
            <[u8; 32]>::try_from(k.as_slice())
                .map_err(|_| anyhow::anyhow!("--signer-key must be 32 bytes"))
        })
        .transpose()?;
    let signature_verifier = match signer_key {
        Some(key) => Ed25519ReportVerifier::pinned(key),
        None => Ed25519ReportVerifier::new(),
    };

    let opts = VerifyOptions {
        nonce: decode_hex(args.nonce.as_deref(), "--nonce")?,
        expected_model_digest: decode_hex(args.model_digest.as_deref(), "--model-digest")?,
        expected_measurement: decode_hex(
            args.expected_measurement.as_deref(),
            "--expected-measurement",
        )?,
        allow_simulated: args.allow_simulated,
        hardware_verifier: if report.tee_type == TeeType::Simulated {
            Some(&signature_verifier)
        } else {
            None
        },
    };

    let result =
        verify_report(&report, &opts).map_err(|e| anyhow::anyhow!("verification failed: {e}"))?;

    let status = |checked: bool| if checked { "✓ verified" } else { "- skipped" };
    println!("TEE type:     {}", report.tee_type);
    println!("Timestamp:    {}", report.timestamp);
    println!("Nonce:        {}", status(result.nonce_verified));
    println!("Model digest: {}", status(result.model_digest_verified));
    println!("Measurement:  {}", status(result.measurement_verified));
    println!("Signature:    {}", status(result.hardware_verified));
    println!("\nAttestation OK");
    Ok(())
}
