//! The trusted boundary and its entry points.
//!
//! [`Enclave`] is the Boundary Entry Dispatcher: it owns the single Secret
//! Store, serializes access to it with one lock, validates every host buffer
//! before touching it, and bounds each external capability call with a
//! timeout.

pub mod attest;
pub mod boundary;
pub mod inference;
pub mod loader;
pub mod secret_store;

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::EnclaveConfig;
use crate::error::{EnclaveError, Result};
use crate::tee::attestation::TeeProvider;
use crate::tee::key_provider::{KeyProvider, ModelKey};

use self::attest::AttestationGenerator;
use self::boundary::{check_declared_len, check_host_buffer, check_outside_secret, MemoryRegion};
use self::inference::{DenseKernel, InferenceEngine, InferenceKernel};
use self::loader::ModelLoader;
use self::secret_store::SecretStore;

/// Lifecycle state of the boundary.
///
/// There is no `Uninitialized` variant: before [`Enclave::create`] returns
/// there is no boundary to call into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryState {
    /// Created, no model loaded. Attestation is available.
    Ready,
    /// A model is resident. All entry points are available.
    ModelLoaded,
    /// Torn down. Every entry point fails with `Terminated`.
    Terminated,
}

impl std::fmt::Display for BoundaryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundaryState::Ready => write!(f, "ready"),
            BoundaryState::ModelLoaded => write!(f, "model_loaded"),
            BoundaryState::Terminated => write!(f, "terminated"),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    store: SecretStore,
    terminated: bool,
}

impl Inner {
    fn state(&self) -> BoundaryState {
        if self.terminated {
            BoundaryState::Terminated
        } else if self.store.is_loaded() {
            BoundaryState::ModelLoaded
        } else {
            BoundaryState::Ready
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.terminated {
            return Err(EnclaveError::Terminated);
        }
        Ok(())
    }
}

/// A confidential-inference boundary holding at most one decrypted model.
///
/// All entry points take `&self`; share an `Enclave` across tasks with `Arc`.
/// `load_model` holds the write lock until the previous model is erased and
/// the new one installed, so readers never observe a partial replacement.
pub struct Enclave {
    config: EnclaveConfig,
    inner: RwLock<Inner>,
    key_provider: Arc<dyn KeyProvider>,
    loader: ModelLoader,
    engine: InferenceEngine,
    attestor: AttestationGenerator,
}

impl Enclave {
    /// Creation hook: `Uninitialized -> Ready`.
    pub fn create(
        config: EnclaveConfig,
        key_provider: Arc<dyn KeyProvider>,
        tee_provider: Arc<dyn TeeProvider>,
    ) -> Result<Self> {
        let kernel = Arc::new(DenseKernel::new(config.output_dim));
        Self::with_kernel(config, key_provider, tee_provider, kernel)
    }

    /// Like [`Enclave::create`] with a custom inference kernel.
    pub fn with_kernel(
        config: EnclaveConfig,
        key_provider: Arc<dyn KeyProvider>,
        tee_provider: Arc<dyn TeeProvider>,
        kernel: Arc<dyn InferenceKernel>,
    ) -> Result<Self> {
        config.validate()?;

        let loader = ModelLoader::from_config(&config);
        let engine = InferenceEngine::new(kernel);
        let attestor = AttestationGenerator::new(
            tee_provider,
            config.attestation_timeout(),
            config.bind_model_digest,
        );

        tracing::info!(
            tee = %attestor.tee_type(),
            key_provider = key_provider.provider_name(),
            kernel = engine.kernel_name(),
            "Enclave created"
        );

        Ok(Self {
            config,
            inner: RwLock::new(Inner::default()),
            key_provider,
            loader,
            engine,
            attestor,
        })
    }

    pub fn config(&self) -> &EnclaveConfig {
        &self.config
    }

    pub async fn state(&self) -> BoundaryState {
        self.inner.read().await.state()
    }

    pub async fn is_loaded(&self) -> bool {
        self.inner.read().await.store.is_loaded()
    }

    /// Number of weights in the loaded model, 0 if none.
    pub async fn weight_count(&self) -> usize {
        self.inner.read().await.store.weight_count()
    }

    /// SHA-256 of the loaded model's serialized weights.
    pub async fn model_digest(&self) -> Option<[u8; 32]> {
        self.inner.read().await.store.model_digest().copied()
    }

    /// Output length `run_inference` will produce for the loaded model.
    pub async fn output_len(&self) -> Result<usize> {
        let inner = self.inner.read().await;
        inner.ensure_live()?;
        self.engine.output_len(&inner.store)
    }

    /// `LoadModel`: decrypt `blob` with the provisioned key and install it.
    ///
    /// `len` is the host's declared blob length. On any failure the previously
    /// loaded model, if any, stays resident and unchanged.
    pub async fn load_model(&self, blob: &[u8], len: usize) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_live()?;
        check_declared_len("blob", len, blob.len())?;
        check_outside_secret("blob", MemoryRegion::of(blob), inner.store.region())?;

        let result = self.decrypt_and_validate(blob).await;
        match result {
            Ok(weights) => {
                let count = weights.len();
                let digest = hex::encode(weights.digest());
                inner.store.install(weights);
                tracing::info!(weights = count, digest = %digest, "Model loaded into enclave");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(code = e.code(), error = %e, "Model load rejected");
                Err(e)
            }
        }
    }

    async fn decrypt_and_validate(&self, blob: &[u8]) -> Result<secret_store::ModelWeights> {
        let key = self.obtain_key().await?;
        let weights = self.loader.decrypt(blob, &key)?;
        drop(key);
        self.engine.validate_model(weights.len())?;
        Ok(weights)
    }

    /// `ObtainModelKey` under the configured deadline.
    async fn obtain_key(&self) -> Result<ModelKey> {
        let timeout = self.config.key_timeout();
        match tokio::time::timeout(timeout, self.key_provider.get_key()).await {
            Ok(Ok(key)) => Ok(key),
            Ok(Err(EnclaveError::KeyUnavailable(msg))) => Err(EnclaveError::KeyUnavailable(msg)),
            Ok(Err(e)) => Err(EnclaveError::KeyUnavailable(e.to_string())),
            Err(_) => Err(EnclaveError::Timeout {
                operation: "ObtainModelKey",
                after: timeout,
            }),
        }
    }

    /// `RunInference`: evaluate the loaded model on the first `input_count`
    /// values of `input`, writing into `output`.
    ///
    /// Returns the number of output values written.
    pub async fn run_inference(
        &self,
        input: &[f32],
        input_count: usize,
        output: &mut [f32],
    ) -> Result<usize> {
        let inner = self.inner.read().await;
        inner.ensure_live()?;
        let secret = inner.store.region();
        check_host_buffer("input", input, input_count, secret)?;
        check_outside_secret("output", MemoryRegion::of(output), secret)?;

        let written = self.engine.run(&inner.store, input, output)?;
        tracing::debug!(inputs = input_count, outputs = written, "Inference complete");
        Ok(written)
    }

    /// `GenerateAttestation`: bind `nonce` into a hardware report and copy it
    /// into `report`.
    ///
    /// Returns the exact report length. Valid in any non-terminated state.
    pub async fn generate_attestation(
        &self,
        nonce: &[u8],
        nonce_len: usize,
        report: &mut [u8],
    ) -> Result<usize> {
        let inner = self.inner.read().await;
        inner.ensure_live()?;
        let secret = inner.store.region();
        check_host_buffer("nonce", nonce, nonce_len, secret)?;
        check_outside_secret("report", MemoryRegion::of(report), secret)?;
        if nonce_len > self.config.max_nonce_bytes {
            return Err(EnclaveError::InvalidArgument(format!(
                "nonce: {nonce_len} bytes exceeds limit of {}",
                self.config.max_nonce_bytes
            )));
        }

        let digest = inner.store.model_digest();
        match self.attestor.generate(nonce, digest, report).await {
            Ok(len) => {
                tracing::info!(
                    report_bytes = len,
                    model_bound = digest.is_some() && self.config.bind_model_digest,
                    "Attestation generated"
                );
                Ok(len)
            }
            Err(e) => {
                tracing::warn!(code = e.code(), error = %e, "Attestation request failed");
                Err(e)
            }
        }
    }

    /// Erase the current model and return to `Ready`.
    pub async fn unload_model(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_live()?;
        if inner.store.is_loaded() {
            inner.store.clear();
            tracing::info!("Model unloaded from enclave");
        }
        Ok(())
    }

    /// Destruction hook: erase the model and move to `Terminated`.
    ///
    /// Idempotent.
    pub async fn terminate(&self) {
        let mut inner = self.inner.write().await;
        if inner.terminated {
            return;
        }
        inner.store.clear();
        inner.terminated = true;
        tracing::info!("Enclave terminated");
    }
}

impl std::fmt::Debug for Enclave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enclave")
            .field("key_provider", &self.key_provider.provider_name())
            .field("engine", &self.engine)
            .field("attestor", &self.attestor)
            .finish_non_exhaustive()
    }
}
