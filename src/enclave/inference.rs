//! Inference Engine: deterministic numeric transform over the loaded weights.

use std::sync::Arc;

use crate::enclave::secret_store::SecretStore;
use crate::error::{EnclaveError, Result};

/// A fixed-shape numeric model evaluated over the resident weights.
///
/// Output length must depend on the weight count only, never on the input.
pub trait InferenceKernel: Send + Sync {
    fn name(&self) -> &str;

    /// Reject weight counts this kernel cannot interpret.
    fn validate(&self, weight_count: usize) -> Result<()>;

    /// Number of output values produced for a model of `weight_count` weights.
    fn output_len(&self, weight_count: usize) -> usize;

    /// Evaluate into `output`, which is exactly `output_len` long.
    fn compute(&self, weights: &[f32], input: &[f32], output: &mut [f32]);
}

/// Row-major dense layer: `outputs` rows of `weight_count / outputs` columns.
///
/// With one output this is the plain dot product of input and weights.
/// Inputs beyond the column count are ignored; missing inputs contribute
/// nothing. Accumulation is in `f64` so results are reproducible to the bit.
#[derive(Debug, Clone, Copy)]
pub struct DenseKernel {
    outputs: usize,
}

impl DenseKernel {
    pub fn new(outputs: usize) -> Self {
        Self {
            outputs: outputs.max(1),
        }
    }

    pub fn dot_product() -> Self {
        Self::new(1)
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }
}

impl InferenceKernel for DenseKernel {
    fn name(&self) -> &str {
        if self.outputs == 1 {
            "dot-product"
        } else {
            "dense"
        }
    }

    fn validate(&self, weight_count: usize) -> Result<()> {
        if weight_count == 0 || weight_count % self.outputs != 0 {
            return Err(EnclaveError::MalformedModel(format!(
                "{weight_count} weights cannot form {} equal rows",
                self.outputs
            )));
        }
        Ok(())
    }

    fn output_len(&self, _weight_count: usize) -> usize {
        self.outputs
    }

    fn compute(&self, weights: &[f32], input: &[f32], output: &mut [f32]) {
        let cols = weights.len() / self.outputs;
        let used = input.len().min(cols);
        for (row, out) in weights.chunks_exact(cols).zip(output.iter_mut()) {
            let acc: f64 = row[..used]
                .iter()
                .zip(&input[..used])
                .map(|(&w, &x)| f64::from(w) * f64::from(x))
                .sum();
            *out = acc as f32;
        }
    }
}

/// Runs the configured kernel against the Secret Store.
#[derive(Clone)]
pub struct InferenceEngine {
    kernel: Arc<dyn InferenceKernel>,
}

impl InferenceEngine {
    pub fn new(kernel: Arc<dyn InferenceKernel>) -> Self {
        Self { kernel }
    }

    pub fn kernel_name(&self) -> &str {
        self.kernel.name()
    }

    pub fn validate_model(&self, weight_count: usize) -> Result<()> {
        self.kernel.validate(weight_count)
    }

    /// Output length for the loaded model.
    pub fn output_len(&self, store: &SecretStore) -> Result<usize> {
        if !store.is_loaded() {
            return Err(EnclaveError::ModelNotLoaded);
        }
        Ok(self.kernel.output_len(store.weight_count()))
    }

    /// Evaluate the loaded model on `input`, writing into `output`.
    ///
    /// Returns the number of values written. On error nothing is written.
    pub fn run(&self, store: &SecretStore, input: &[f32], output: &mut [f32]) -> Result<usize> {
        let weights = store.weights().ok_or(EnclaveError::ModelNotLoaded)?;
        let required = self.kernel.output_len(weights.len());
        if output.len() < required {
            return Err(EnclaveError::InsufficientOutputCapacity {
                required,
                capacity: output.len(),
            });
        }
        self.kernel.compute(weights, input, &mut output[..required]);
        Ok(required)
    }
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("kernel", &self.kernel.name())
            .finish()
    }
}
