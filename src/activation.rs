//! Activation functions for gates and cell outputs.
//!
//! The backward pass never relies on autodiff: each activation exposes an
//! explicit [`Activation::backprop`] that evaluates its derivative from the
//! cached pre-activation/activation pair produced during the forward pass.

use burn::tensor::activation;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Selectable nonlinearity for the gates and the cell output.
///
/// `Sigmoid` is the conventional choice for the input/forget/output gates,
/// `Tanh` for the input modulation and the cell-output squashing. `Sign` is a
/// hard threshold with no usable derivative; requesting it for a training
/// forward pass is rejected as an unsupported configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Activation {
    Sigmoid,
    Tanh,
    HardSigmoid,
    Identity,
    Relu,
    Sign,
}

impl Activation {
    /// Apply the activation element-wise.
    pub fn apply<B: Backend, const D: usize>(&self, z: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::Sigmoid => activation::sigmoid(z),
            Activation::Tanh => z.tanh(),
            Activation::HardSigmoid => z.mul_scalar(0.2).add_scalar(0.5).clamp(0.0, 1.0),
            Activation::Identity => z,
            Activation::Relu => activation::relu(z),
            Activation::Sign => z.sign(),
        }
    }

    /// Chain the upstream gradient through this activation.
    ///
    /// `z` is the cached pre-activation, `a` the cached activation `apply(z)`.
    /// Where the derivative is expressible from the activation alone (sigmoid,
    /// tanh) the cached output is used directly.
    pub fn backprop<B: Backend, const D: usize>(
        &self,
        z: Tensor<B, D>,
        a: Tensor<B, D>,
        upstream: Tensor<B, D>,
    ) -> Tensor<B, D> {
        match self {
            // sigma'(z) = a * (1 - a)
            Activation::Sigmoid => upstream * (a.clone() - a.clone() * a),
            // tanh'(z) = 1 - a^2
            Activation::Tanh => upstream * (-(a.clone() * a) + 1.0),
            // 0.2 on the linear segment |z| < 2.5, zero on the saturated tails
            Activation::HardSigmoid => upstream * z.abs().lower_elem(2.5).float().mul_scalar(0.2),
            Activation::Identity => upstream,
            Activation::Relu => upstream * z.greater_elem(0.0).float(),
            // No defined gradient; callers must reject this before backprop.
            Activation::Sign => upstream.zeros_like(),
        }
    }

    /// Whether a meaningful derivative exists for the backward pass.
    pub fn supports_backprop(&self) -> bool {
        !matches!(self, Activation::Sign)
    }
}
