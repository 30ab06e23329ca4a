//! Caller-owned gradient accumulation buffers.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::config::LstmConfig;
use crate::error::{LstmError, Result};
use crate::params::LstmParams;

/// Gradient buffers matching the parameter shapes, peephole columns included.
///
/// The backward engine only ever *adds into* these buffers; it never replaces
/// their contents. Calling backward repeatedly with the same buffers therefore
/// accumulates gradients across calls, which is what truncated-BPTT training
/// over consecutive segments relies on. Zero them explicitly between optimizer
/// steps with [`LstmGradients::zeros`].
#[derive(Debug, Clone)]
pub struct LstmGradients<B: Backend> {
    /// Gradient of the input weights, `[n_in, 4H]`.
    pub input_weights: Tensor<B, 2>,
    /// Gradient of the recurrent weights and peephole columns, `[H, 4H + 3]`.
    pub recurrent_weights: Tensor<B, 2>,
    /// Gradient of the biases, `[4H]`.
    pub bias: Tensor<B, 1>,
}

impl<B: Backend> LstmGradients<B> {
    /// Allocate zeroed buffers for the given configuration.
    pub fn zeros(config: &LstmConfig, device: &B::Device) -> Self {
        let n_in = config.input_size;
        let h = config.hidden_size;
        Self {
            input_weights: Tensor::zeros([n_in, 4 * h], device),
            recurrent_weights: Tensor::zeros([h, 4 * h + 3], device),
            bias: Tensor::zeros([4 * h], device),
        }
    }

    /// Validate buffer shapes against the configuration.
    pub fn shape_check(&self, config: &LstmConfig) -> Result<()> {
        let n_in = config.input_size;
        let h = config.hidden_size;
        let dims = self.input_weights.dims();
        if dims != [n_in, 4 * h] {
            return Err(LstmError::dims("input weight gradient", &[n_in, 4 * h], &dims));
        }
        let dims = self.recurrent_weights.dims();
        if dims != [h, 4 * h + 3] {
            return Err(LstmError::dims(
                "recurrent weight gradient",
                &[h, 4 * h + 3],
                &dims,
            ));
        }
        let dims = self.bias.dims();
        if dims != [4 * h] {
            return Err(LstmError::dims("bias gradient", &[4 * h], &dims));
        }
        Ok(())
    }

    /// Add one segment's contribution into the buffers.
    pub(crate) fn accumulate(
        &mut self,
        input_weights: Tensor<B, 2>,
        recurrent_weights: Tensor<B, 2>,
        bias: Tensor<B, 1>,
    ) {
        self.input_weights = self.input_weights.clone() + input_weights;
        self.recurrent_weights = self.recurrent_weights.clone() + recurrent_weights;
        self.bias = self.bias.clone() + bias;
    }

    /// One plain SGD step: `params - lr * grads`. Convenience for demos and
    /// tests; real optimizers live outside this crate.
    pub fn apply_sgd(&self, params: &LstmParams<B>, learning_rate: f64) -> LstmParams<B> {
        LstmParams {
            input_weights: params.input_weights.clone()
                - self.input_weights.clone().mul_scalar(learning_rate),
            recurrent_weights: params.recurrent_weights.clone()
                - self.recurrent_weights.clone().mul_scalar(learning_rate),
            bias: params.bias.clone() - self.bias.clone().mul_scalar(learning_rate),
        }
    }
}
