//! Layer configuration.

use crate::activation::Activation;

/// Whether a training forward pass retains its trajectory bundle for the
/// immediately following backward call.
///
/// With `Enabled`, `activate(.., training=true)` stores the bundle in the
/// layer's one-slot cache and the next backward call consumes it instead of
/// recomputing the forward pass. Inference passes never touch the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CacheMode {
    None,
    Enabled,
}

/// Configuration for a [`GravesLstm`](crate::layer::GravesLstm) layer.
///
/// `activation` is used both for the input modulation gate and for squashing
/// the cell state on output; `gate_activation` is shared by the input, forget
/// and output gates. These match the defaults of the Graves formulation
/// (tanh / sigmoid).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LstmConfig {
    /// Number of input features per time step.
    pub input_size: usize,
    /// Number of LSTM units (hidden/cell state width).
    pub hidden_size: usize,
    /// Nonlinearity for the input, forget and output gates.
    pub gate_activation: Activation,
    /// Nonlinearity for the modulation gate and the cell output.
    pub activation: Activation,
    /// Forward-pass caching policy for training.
    pub cache_mode: CacheMode,
    /// Initial value of the forget-gate bias block. A positive value keeps the
    /// forget gate open early in training.
    pub forget_gate_bias_init: f64,
}

impl LstmConfig {
    /// Create a configuration with the standard Graves defaults.
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        Self {
            input_size,
            hidden_size,
            gate_activation: Activation::Sigmoid,
            activation: Activation::Tanh,
            cache_mode: CacheMode::None,
            forget_gate_bias_init: 1.0,
        }
    }

    /// Set the gate nonlinearity.
    pub fn with_gate_activation(mut self, gate_activation: Activation) -> Self {
        self.gate_activation = gate_activation;
        self
    }

    /// Set the modulation/output nonlinearity.
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Set the forward-pass caching policy.
    pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
        self.cache_mode = cache_mode;
        self
    }

    /// Set the initial forget-gate bias.
    pub fn with_forget_gate_bias_init(mut self, value: f64) -> Self {
        self.forget_gate_bias_init = value;
        self
    }
}
