use std::sync::Arc;

use clap::Parser;
use rand::RngCore;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use a3s_enclave::cli::{demo_input, demo_weights, Cli, Command, DemoArgs, KeygenArgs, SealArgs};
use a3s_enclave::config::EnclaveConfig;
use a3s_enclave::enclave::loader::seal_weights;
use a3s_enclave::tee::attestation::SimulatedTeeProvider;
use a3s_enclave::tee::key_provider::{
    self, load_key, KeyProvider, KeySource, MemoryKeyProvider, ModelKey,
};
use a3s_enclave::Enclave;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Keygen(args) => run_keygen(args)?,
        Command::Seal(args) => run_seal(args)?,
        Command::Demo(args) => {
            init_tracing();
            run_demo(args).await?;
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

// ── Keygen ───────────────────────────────────────────────────────────────────

fn random_key() -> ModelKey {
    let mut key = Zeroizing::new([0u8; 32]);
    rand::rngs::OsRng.fill_bytes(&mut key[..]);
    key
}

fn run_keygen(args: KeygenArgs) -> anyhow::Result<()> {
    let key = random_key();
    let hex_key = Zeroizing::new(hex::encode(&key[..]));
    match args.out {
        Some(path) => {
            std::fs::write(&path, hex_key.as_bytes())
                .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;
            println!("Wrote key to {}", path.display());
        }
        None => println!("{}", hex_key.as_str()),
    }
    Ok(())
}

// ── Seal ─────────────────────────────────────────────────────────────────────

fn run_seal(args: SealArgs) -> anyhow::Result<()> {
    let key = load_key(&KeySource::File(args.key_file))?;
    let blob = seal_weights(&args.weights, &key)?;
    std::fs::write(&args.out, &blob)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", args.out.display()))?;
    println!(
        "Sealed {} weights into {} ({} bytes)",
        args.weights.len(),
        args.out.display(),
        blob.len()
    );
    Ok(())
}

// ── Demo ─────────────────────────────────────────────────────────────────────

async fn run_demo(args: DemoArgs) -> anyhow::Result<()> {
    let config = match args.config {
        Some(ref path) => EnclaveConfig::load_from(path)?,
        None => EnclaveConfig::load()?,
    };

    // --key-file wins over the configured key source; without either the
    // demo runs with a throwaway key.
    let (key, key_provider): (ModelKey, Arc<dyn KeyProvider>) = match args.key_file {
        Some(ref path) => {
            let key = load_key(&KeySource::File(path.clone()))?;
            let provider: Arc<dyn KeyProvider> = Arc::new(MemoryKeyProvider::new(*key));
            (key, provider)
        }
        None => match (config.key_source.as_ref(), key_provider::from_config(&config)) {
            (Some(source), Some(provider)) => (load_key(source)?, provider),
            _ => {
                let key = random_key();
                let provider: Arc<dyn KeyProvider> = Arc::new(MemoryKeyProvider::new(*key));
                (key, provider)
            }
        },
    };
    let blob = match args.blob {
        Some(ref path) => std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?,
        None => seal_weights(&demo_weights(), &key)?,
    };
    let nonce = match args.nonce {
        Some(ref n) => hex::decode(n).map_err(|e| anyhow::anyhow!("invalid --nonce hex: {e}"))?,
        None => vec![0u8; 16],
    };
    let input = args.input.unwrap_or_else(demo_input);

    let tee = Arc::new(SimulatedTeeProvider::new());
    let enclave = Enclave::create(config, key_provider, tee.clone())?;
    drop(key);

    let report = demo_lifecycle(&enclave, &blob, &input, &nonce, args.report_capacity).await?;
    println!("Measurement:   {}", hex::encode(tee.measurement()));
    println!("Signer key:    {}", hex::encode(tee.public_key()));

    if let (Some(path), Some(report)) = (args.report_out.as_ref(), report) {
        std::fs::write(path, &report)
            .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;
        println!("Saved report to {}", path.display());
    }
    Ok(())
}

/// Load, infer and attest, then always terminate the boundary.
///
/// A load failure is returned after teardown. Inference and attestation
/// failures are printed and do not stop the run. Returns the report bytes
/// when attestation succeeded.
async fn demo_lifecycle(
    enclave: &Enclave,
    blob: &[u8],
    input: &[f32],
    nonce: &[u8],
    report_capacity: usize,
) -> anyhow::Result<Option<Vec<u8>>> {
    if let Err(e) = enclave.load_model(blob, blob.len()).await {
        enclave.terminate().await;
        return Err(anyhow::anyhow!("model load failed: {e}"));
    }
    if let Some(digest) = enclave.model_digest().await {
        println!("Model digest:  {}", hex::encode(digest));
    }

    let mut output = vec![0.0f32; enclave.output_len().await.unwrap_or(0)];
    match enclave.run_inference(input, input.len(), &mut output).await {
        Ok(written) => println!("Inference:     {:?}", &output[..written]),
        Err(e) => println!("Inference:     failed ({}: {e})", e.code()),
    }

    let mut report = vec![0u8; report_capacity];
    let report = match enclave
        .generate_attestation(nonce, nonce.len(), &mut report)
        .await
    {
        Ok(len) => {
            println!("Report size:   {len} bytes");
            report.truncate(len);
            Some(report)
        }
        Err(e) => {
            println!("Attestation:   failed ({}: {e})", e.code());
            None
        }
    };

    enclave.terminate().await;
    Ok(report)
}
