//! Graves (peephole) LSTM layers for the [burn](https://burn.dev) tensor
//! stack.
//!
//! The crate is split along a simple line: pure computation engines and a
//! stateful layer driving them.
//!
//! - [`engine`] holds the forward and backward passes as free functions over
//!   explicit inputs. They never touch layer state, which makes them easy to
//!   test and to check against finite differences.
//! - [`layer`] holds [`GravesLstm`](layer::GravesLstm), which owns the
//!   parameters, a one-slot forward-pass cache and two recurrent state
//!   tables (streaming inference and truncated-BPTT continuation).
//! - [`params`] and [`gradient`] define the parameter block and the
//!   gradient buffer the backward pass accumulates into.
//!
//! Sequences are laid out `[batch, features, time]` throughout, hidden state
//! snapshots `[batch, hidden]`. All fallible entry points return
//! [`error::Result`]; errors are diagnostics for caller mistakes, never
//! retryable conditions.
//!
//! # Quick start
//!
//! ```ignore
//! use burn::backend::NdArray;
//! use graves_lstm::prelude::*;
//!
//! type Backend = NdArray<f32>;
//!
//! let device = Default::default();
//! let config = LstmConfig::new(8, 16).with_cache_mode(CacheMode::Enabled);
//! let mut lstm = GravesLstm::<Backend>::new(config, &device);
//!
//! // Training step: forward, then backward with the loss gradient.
//! let output = lstm.activate(&input, true)?;
//! let mut grads = LstmGradients::zeros(lstm.config(), &device);
//! let input_grad = lstm.backprop_gradient(&epsilon, &mut grads)?;
//! lstm.set_params(grads.apply_sgd(lstm.params(), 1e-2))?;
//!
//! // Streaming inference, one step at a time.
//! lstm.rnn_clear_previous_state();
//! let step_out = lstm.rnn_time_step(&step_input)?;
//! ```

pub mod activation;
pub mod config;
pub mod engine;
pub mod error;
pub mod gradient;
pub mod layer;
pub mod params;

pub mod prelude {
    //! Commonly used types, for glob import.
    pub use crate::activation::Activation;
    pub use crate::config::{CacheMode, LstmConfig};
    pub use crate::engine::{activate_sequence, backprop_gradient_helper, FwdPassReturn};
    pub use crate::error::{LstmError, Result};
    pub use crate::gradient::LstmGradients;
    pub use crate::layer::{FwdPassCache, GravesLstm, MaskState, RnnStateMap, StateKey};
    pub use crate::params::{LstmParams, WeightNoise};
}
