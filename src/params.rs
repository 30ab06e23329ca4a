//! Parameter container: input weights, recurrent weights with appended
//! peephole columns, and biases.
//!
//! Column layout follows the classic packed convention: the gate blocks are
//! ordered `[input, forget, output, modulation]`, and the recurrent matrix
//! carries three extra columns holding the peephole weight vectors
//! `p_i`, `p_f`, `p_o` after the gate blocks:
//!
//! | Tensor | Shape | Columns |
//! |--------|-------|---------|
//! | `input_weights` | `[n_in, 4H]` | `wI \| wF \| wO \| wG` |
//! | `recurrent_weights` | `[H, 4H + 3]` | `rI \| rF \| rO \| rG \| p_i \| p_f \| p_o` |
//! | `bias` | `[4H]` | `bI \| bF \| bO \| bG` |

use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};

use crate::config::LstmConfig;
use crate::error::{LstmError, Result};

/// Index of the input gate block.
pub const GATE_I: usize = 0;
/// Index of the forget gate block.
pub const GATE_F: usize = 1;
/// Index of the output gate block.
pub const GATE_O: usize = 2;
/// Index of the input modulation gate block.
pub const GATE_G: usize = 3;

/// Optional multiplicative/additive transform applied to a copy of the
/// parameters at the start of a training pass. The noised view is held so
/// that the forward pass and its paired backward pass see identical weights,
/// and is discarded once the backward pass completes.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub enum WeightNoise {
    /// Add zero-mean Gaussian noise with the given standard deviation.
    Additive { stddev: f64 },
    /// Multiply by `1 + N(0, stddev)`.
    Multiplicative { stddev: f64 },
    /// Zero each weight independently with probability `1 - retain_prob`.
    DropConnect { retain_prob: f64 },
}

impl WeightNoise {
    fn transform<B: Backend, const D: usize>(&self, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let shape = tensor.dims();
        let device = tensor.device();
        match *self {
            WeightNoise::Additive { stddev } => {
                tensor + Tensor::random(shape, Distribution::Normal(0.0, stddev), &device)
            }
            WeightNoise::Multiplicative { stddev } => {
                let scale =
                    Tensor::random(shape, Distribution::Normal(0.0, stddev), &device) + 1.0;
                tensor * scale
            }
            WeightNoise::DropConnect { retain_prob } => {
                tensor * Tensor::random(shape, Distribution::Bernoulli(retain_prob), &device)
            }
        }
    }
}

/// The layer's trainable parameters.
///
/// The struct is a read-only collaborator of the computation engines: neither
/// the forward nor the backward pass mutates it. Gradients accumulate in a
/// separate [`LstmGradients`](crate::gradient::LstmGradients) with matching
/// shapes.
#[derive(Debug, Clone)]
pub struct LstmParams<B: Backend> {
    /// Input-to-gate weights, `[n_in, 4H]`.
    pub input_weights: Tensor<B, 2>,
    /// Recurrent weights plus peephole columns, `[H, 4H + 3]`.
    pub recurrent_weights: Tensor<B, 2>,
    /// Gate biases, `[4H]`.
    pub bias: Tensor<B, 1>,
}

impl<B: Backend> LstmParams<B> {
    /// Initialize parameters with uniform Xavier sampling. The forget-gate
    /// bias block starts at `config.forget_gate_bias_init`.
    pub fn init(config: &LstmConfig, device: &B::Device) -> Self {
        let n_in = config.input_size;
        let h = config.hidden_size;

        let limit_in = (6.0 / (n_in + h) as f64).sqrt();
        let limit_rec = (6.0 / (2 * h) as f64).sqrt();

        let input_weights = Tensor::random(
            [n_in, 4 * h],
            Distribution::Uniform(-limit_in, limit_in),
            device,
        );
        let recurrent_weights = Tensor::random(
            [h, 4 * h + 3],
            Distribution::Uniform(-limit_rec, limit_rec),
            device,
        );

        let bias = Tensor::zeros([4 * h], device).slice_assign(
            [GATE_F * h..GATE_F * h + h],
            Tensor::full([h], config.forget_gate_bias_init, device),
        );

        Self {
            input_weights,
            recurrent_weights,
            bias,
        }
    }

    /// Validate parameter shapes against the configuration.
    pub fn shape_check(&self, config: &LstmConfig) -> Result<()> {
        let n_in = config.input_size;
        let h = config.hidden_size;

        let dims = self.input_weights.dims();
        if dims != [n_in, 4 * h] {
            return Err(LstmError::dims("input weights", &[n_in, 4 * h], &dims));
        }
        let dims = self.recurrent_weights.dims();
        if dims != [h, 4 * h + 3] {
            return Err(LstmError::dims("recurrent weights", &[h, 4 * h + 3], &dims));
        }
        let dims = self.bias.dims();
        if dims != [4 * h] {
            return Err(LstmError::dims("bias", &[4 * h], &dims));
        }
        Ok(())
    }

    /// Produce the noised view of the parameters used by one training
    /// forward/backward pair.
    pub fn with_noise(&self, noise: &WeightNoise) -> Self {
        Self {
            input_weights: noise.transform(self.input_weights.clone()),
            recurrent_weights: noise.transform(self.recurrent_weights.clone()),
            bias: self.bias.clone(),
        }
    }

    /// Recurrent gate blocks without the peephole columns, `[H, 4H]`.
    pub(crate) fn recurrent_gate_weights(&self, h: usize) -> Tensor<B, 2> {
        self.recurrent_weights.clone().slice([0..h, 0..4 * h])
    }

    /// One peephole weight vector as a broadcastable row, `[1, H]`.
    /// `index` is 0 for `p_i`, 1 for `p_f`, 2 for `p_o`.
    pub(crate) fn peephole_row(&self, h: usize, index: usize) -> Tensor<B, 2> {
        self.recurrent_weights
            .clone()
            .slice([0..h, 4 * h + index..4 * h + index + 1])
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_init_shapes() {
        let device = Default::default();
        let config = LstmConfig::new(7, 5);
        let params = LstmParams::<Backend>::init(&config, &device);

        assert_eq!(params.input_weights.dims(), [7, 20]);
        assert_eq!(params.recurrent_weights.dims(), [5, 23]);
        assert_eq!(params.bias.dims(), [20]);
        assert!(params.shape_check(&config).is_ok());
    }

    #[test]
    fn test_forget_gate_bias_block() {
        let device = Default::default();
        let config = LstmConfig::new(3, 4).with_forget_gate_bias_init(1.0);
        let params = LstmParams::<Backend>::init(&config, &device);

        let bias: Vec<f32> = params.bias.into_data().to_vec().unwrap();
        for (idx, value) in bias.iter().enumerate() {
            let expected = if (4..8).contains(&idx) { 1.0 } else { 0.0 };
            assert_eq!(*value, expected, "bias element {idx}");
        }
    }

    #[test]
    fn test_shape_check_rejects_wrong_hidden_size() {
        let device = Default::default();
        let params = LstmParams::<Backend>::init(&LstmConfig::new(3, 4), &device);
        let other = LstmConfig::new(3, 6);
        assert!(matches!(
            params.shape_check(&other),
            Err(LstmError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_weight_noise_keeps_shapes() {
        let device = Default::default();
        let config = LstmConfig::new(3, 4);
        let params = LstmParams::<Backend>::init(&config, &device);
        for noise in [
            WeightNoise::Additive { stddev: 0.1 },
            WeightNoise::Multiplicative { stddev: 0.1 },
            WeightNoise::DropConnect { retain_prob: 0.5 },
        ] {
            let noised = params.with_noise(&noise);
            assert!(noised.shape_check(&config).is_ok());
        }
    }

    #[test]
    fn test_zero_noise_is_identity() {
        let device = Default::default();
        let config = LstmConfig::new(2, 3);
        let params = LstmParams::<Backend>::init(&config, &device);
        let noised = params.with_noise(&WeightNoise::DropConnect { retain_prob: 1.0 });

        let diff = (params.input_weights - noised.input_weights)
            .abs()
            .sum()
            .into_scalar();
        assert_eq!(diff, 0.0);
    }
}
