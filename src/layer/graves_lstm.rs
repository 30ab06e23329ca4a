//! Graves (peephole) LSTM layer.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use tracing::{debug, trace};

use crate::config::{CacheMode, LstmConfig};
use crate::engine::{activate_sequence, backprop_gradient_helper};
use crate::error::{LstmError, Result};
use crate::gradient::LstmGradients;
use crate::layer::cache::FwdPassCache;
use crate::layer::mask::MaskState;
use crate::layer::state::{RnnStateMap, StateKey};
use crate::params::{LstmParams, WeightNoise};

/// A recurrent layer built from gated memory cells with peephole
/// connections, after Graves, "Supervised Sequence Labelling with Recurrent
/// Neural Networks".
///
/// The layer owns one streaming-inference state table, one truncated-BPTT
/// continuation state table and at most one cached trajectory bundle. It is
/// driven by a single caller at a time: the fields are plain mutable state
/// with no internal locking, and concurrent access from several threads must
/// be prevented by the surrounding trainer.
///
/// # Example
///
/// ```ignore
/// use graves_lstm::prelude::*;
///
/// let device = Default::default();
/// let config = LstmConfig::new(16, 32);
/// let mut lstm = GravesLstm::<Backend>::new(config, &device);
///
/// // input: [batch, features, time]
/// let output = lstm.activate(&input, true)?;
/// let mut grads = LstmGradients::zeros(lstm.config(), &device);
/// let input_grad = lstm.backprop_gradient(&epsilon, &mut grads)?;
/// ```
#[derive(Debug)]
pub struct GravesLstm<B: Backend> {
    config: LstmConfig,
    params: LstmParams<B>,
    weight_noise: Option<WeightNoise>,
    /// Noised parameter view for the current training pass; forward and its
    /// paired backward must see identical weights.
    noised_params: Option<LstmParams<B>>,
    /// Input of the most recent forward call, kept for the backward pass.
    input: Option<Tensor<B, 3>>,
    /// Initial `(h, c)` the most recent forward call was seeded with, so a
    /// backward recompute replays exactly that trajectory even if the state
    /// tables have been rewritten since. `None` means a zero initial state.
    fwd_init_act: Option<Tensor<B, 2>>,
    fwd_init_mem_cell: Option<Tensor<B, 2>>,
    mask: Option<Tensor<B, 2>>,
    cached_fwd_pass: FwdPassCache<B>,
    /// Streaming-inference state, written by `rnn_time_step`.
    state: RnnStateMap<B>,
    /// Truncated-BPTT continuation state, written by `tbptt_backprop_gradient`
    /// and `rnn_activate_using_stored_state(.., store_last_for_tbptt=true)`.
    tbptt_state: RnnStateMap<B>,
}

impl<B: Backend> GravesLstm<B> {
    /// Create a layer with freshly initialized parameters.
    pub fn new(config: LstmConfig, device: &B::Device) -> Self {
        let params = LstmParams::init(&config, device);
        Self {
            config,
            params,
            weight_noise: None,
            noised_params: None,
            input: None,
            fwd_init_act: None,
            fwd_init_mem_cell: None,
            mask: None,
            cached_fwd_pass: FwdPassCache::new(),
            state: RnnStateMap::new(),
            tbptt_state: RnnStateMap::new(),
        }
    }

    /// Enable weight noise for training passes.
    pub fn with_weight_noise(mut self, noise: WeightNoise) -> Self {
        self.weight_noise = Some(noise);
        self
    }

    pub fn config(&self) -> &LstmConfig {
        &self.config
    }

    pub fn params(&self) -> &LstmParams<B> {
        &self.params
    }

    /// Replace the parameters, validating their shapes first.
    pub fn set_params(&mut self, params: LstmParams<B>) -> Result<()> {
        params.shape_check(&self.config)?;
        // Stale derived state would silently refer to the old weights.
        self.noised_params = None;
        self.cached_fwd_pass.clear();
        self.params = params;
        Ok(())
    }

    /// Set or clear the validity mask applied to subsequent sequence calls.
    pub fn set_mask_array(&mut self, mask: Option<Tensor<B, 2>>) {
        self.mask = mask;
    }

    /// Plain single-shot forward pass from a zero initial state.
    ///
    /// When `training` is set and the configured cache mode requests it, the
    /// trajectory bundle is retained so the next backward call can reuse it.
    /// Inference passes never populate the cache.
    pub fn activate(&mut self, input: &Tensor<B, 3>, training: bool) -> Result<Tensor<B, 3>> {
        trace!(dims = ?input.dims(), training, "lstm activate");
        self.input = Some(input.clone());
        self.fwd_init_act = None;
        self.fwd_init_mem_cell = None;
        let retain = training && self.config.cache_mode != CacheMode::None;
        let params = self.resolved_params(training);

        let fwd = activate_sequence(
            &self.config,
            &params,
            input,
            None,
            None,
            self.mask.as_ref(),
            retain,
        )?;
        let output = fwd.output.clone();

        // A fresh forward invalidates whatever bundle was waiting.
        self.cached_fwd_pass.clear();
        if retain {
            self.cached_fwd_pass.store(fwd);
        }
        Ok(output)
    }

    /// Full-length backpropagation through time.
    ///
    /// Consumes the cached trajectory bundle if one is waiting, otherwise
    /// recomputes the forward pass explicitly. Parameter gradients are added
    /// into `grads`; the return value is the gradient with respect to the
    /// layer input.
    pub fn backprop_gradient(
        &mut self,
        epsilon: &Tensor<B, 3>,
        grads: &mut LstmGradients<B>,
    ) -> Result<Tensor<B, 3>> {
        trace!(dims = ?epsilon.dims(), "lstm backprop");
        let input = self.stored_input()?;
        let params = self.resolved_params(true);

        let fwd = match self.cached_fwd_pass.take_if_present() {
            Some(bundle) => bundle,
            None => activate_sequence(
                &self.config,
                &params,
                &input,
                self.fwd_init_act.clone(),
                self.fwd_init_mem_cell.clone(),
                self.mask.as_ref(),
                true,
            )?,
        };

        let input_grad = backprop_gradient_helper(
            &self.config,
            &params,
            &input,
            epsilon,
            &fwd,
            false,
            0,
            self.mask.as_ref(),
            grads,
        )?;
        self.noised_params = None;
        Ok(input_grad)
    }

    /// Truncated backpropagation through time over one segment.
    ///
    /// Replays the most recent forward pass: the cached bundle if one is
    /// waiting, otherwise a recompute seeded with the same initial state
    /// that forward actually used. Afterwards the segment's final
    /// hidden/cell state is written into the TBPTT continuation table so the
    /// next segment continues where this one ended. Only the last
    /// `tbptt_length` steps receive gradient.
    pub fn tbptt_backprop_gradient(
        &mut self,
        epsilon: &Tensor<B, 3>,
        tbptt_length: usize,
        grads: &mut LstmGradients<B>,
    ) -> Result<Tensor<B, 3>> {
        debug!(dims = ?epsilon.dims(), tbptt_length, "lstm tbptt backprop");
        let input = self.stored_input()?;
        let params = self.resolved_params(true);

        let fwd = match self.cached_fwd_pass.take_if_present() {
            Some(bundle) => bundle,
            None => activate_sequence(
                &self.config,
                &params,
                &input,
                self.fwd_init_act.clone(),
                self.fwd_init_mem_cell.clone(),
                self.mask.as_ref(),
                true,
            )?,
        };

        // Carry the segment boundary state forward for the next segment.
        self.tbptt_state
            .put(StateKey::PrevActivation, fwd.last_act.clone());
        self.tbptt_state
            .put(StateKey::PrevMemCell, fwd.last_mem_cell.clone());

        let input_grad = backprop_gradient_helper(
            &self.config,
            &params,
            &input,
            epsilon,
            &fwd,
            true,
            tbptt_length,
            self.mask.as_ref(),
            grads,
        )?;
        self.noised_params = None;
        Ok(input_grad)
    }

    /// Streaming single-step (or short-sequence) inference.
    ///
    /// Reads the streaming state table as the initial state, never caches,
    /// and writes the resulting final hidden/cell state back into the
    /// streaming table. The TBPTT continuation table is never touched.
    ///
    /// Any mask set via [`GravesLstm::set_mask_array`] is ignored here: the
    /// layer mask spans a full training sequence and has no meaning for a
    /// streaming step.
    pub fn rnn_time_step(&mut self, input: &Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        trace!(dims = ?input.dims(), "lstm rnn time step");
        self.input = Some(input.clone());
        let init_act = self.state.get(StateKey::PrevActivation);
        let init_mem_cell = self.state.get(StateKey::PrevMemCell);
        self.fwd_init_act = init_act.clone();
        self.fwd_init_mem_cell = init_mem_cell.clone();
        let params = self.resolved_params(false);

        let fwd = activate_sequence(
            &self.config,
            &params,
            input,
            init_act,
            init_mem_cell,
            None,
            false,
        )?;
        self.cached_fwd_pass.clear();
        self.state.put(StateKey::PrevActivation, fwd.last_act);
        self.state.put(StateKey::PrevMemCell, fwd.last_mem_cell);
        Ok(fwd.output)
    }

    /// Forward pass seeded from the streaming state table, for training
    /// contexts that roll a long sequence through in segments.
    ///
    /// With `store_last_for_tbptt` the segment's final state is written into
    /// the TBPTT continuation table; the streaming table itself is only read,
    /// never written, on this path.
    pub fn rnn_activate_using_stored_state(
        &mut self,
        input: &Tensor<B, 3>,
        training: bool,
        store_last_for_tbptt: bool,
    ) -> Result<Tensor<B, 3>> {
        trace!(dims = ?input.dims(), training, store_last_for_tbptt, "lstm stored-state activate");
        self.input = Some(input.clone());
        let init_act = self.state.get(StateKey::PrevActivation);
        let init_mem_cell = self.state.get(StateKey::PrevMemCell);
        self.fwd_init_act = init_act.clone();
        self.fwd_init_mem_cell = init_mem_cell.clone();
        let retain = training && self.config.cache_mode != CacheMode::None;
        let params = self.resolved_params(training);

        let fwd = activate_sequence(
            &self.config,
            &params,
            input,
            init_act,
            init_mem_cell,
            self.mask.as_ref(),
            retain,
        )?;
        if store_last_for_tbptt {
            self.tbptt_state
                .put(StateKey::PrevActivation, fwd.last_act.clone());
            self.tbptt_state
                .put(StateKey::PrevMemCell, fwd.last_mem_cell.clone());
        }
        let output = fwd.output.clone();

        self.cached_fwd_pass.clear();
        if retain {
            self.cached_fwd_pass.store(fwd);
        }
        Ok(output)
    }

    /// Layer-wise pretraining gradient. Has no defined semantics for this
    /// layer and always fails.
    pub fn gradient(&self) -> Result<LstmGradients<B>> {
        Err(LstmError::UnsupportedOperation {
            op: "gradient",
            reason: "layer-wise pretraining is not possible for LSTM layers".into(),
        })
    }

    /// Mask-forwarding policy: the layer changes neither the data nor the
    /// mask, and handles all masking effects internally, so the mask is
    /// passed through and marked inactive for downstream consumers.
    pub fn feed_forward_mask_array(
        &self,
        mask: Tensor<B, 2>,
        _current_mask_state: MaskState,
        _minibatch_size: usize,
    ) -> (Tensor<B, 2>, MaskState) {
        (mask, MaskState::Passthrough)
    }

    /// Streaming state table (read-only view).
    pub fn rnn_get_previous_state(&self) -> &RnnStateMap<B> {
        &self.state
    }

    /// Seed the streaming state table explicitly.
    pub fn rnn_set_previous_state(&mut self, activation: Tensor<B, 2>, mem_cell: Tensor<B, 2>) {
        self.state.put(StateKey::PrevActivation, activation);
        self.state.put(StateKey::PrevMemCell, mem_cell);
    }

    /// Reset the streaming state table to the zero-initial-state condition.
    pub fn rnn_clear_previous_state(&mut self) {
        self.state.clear();
    }

    /// TBPTT continuation state table (read-only view).
    pub fn rnn_get_tbptt_state(&self) -> &RnnStateMap<B> {
        &self.tbptt_state
    }

    /// Seed the TBPTT continuation table explicitly.
    pub fn rnn_set_tbptt_state(&mut self, activation: Tensor<B, 2>, mem_cell: Tensor<B, 2>) {
        self.tbptt_state.put(StateKey::PrevActivation, activation);
        self.tbptt_state.put(StateKey::PrevMemCell, mem_cell);
    }

    /// Reset the TBPTT continuation table.
    pub fn rnn_clear_tbptt_state(&mut self) {
        self.tbptt_state.clear();
    }

    /// Whether a trajectory bundle is waiting for the next backward call.
    pub fn has_cached_fwd_pass(&self) -> bool {
        self.cached_fwd_pass.is_present()
    }

    fn stored_input(&self) -> Result<Tensor<B, 3>> {
        self.input.clone().ok_or_else(|| {
            LstmError::StateMismatch("no forward pass has set an input on this layer".into())
        })
    }

    /// Parameters as seen by the current pass. For training with weight
    /// noise, the noised view is created once and reused until the paired
    /// backward pass clears it.
    fn resolved_params(&mut self, training: bool) -> LstmParams<B> {
        match (&self.weight_noise, training) {
            (Some(noise), true) => {
                if self.noised_params.is_none() {
                    self.noised_params = Some(self.params.with_noise(noise));
                }
                self.noised_params
                    .clone()
                    .unwrap_or_else(|| self.params.clone())
            }
            _ => self.params.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type Backend = NdArray<f32>;

    fn layer(cache_mode: CacheMode) -> GravesLstm<Backend> {
        let device = Default::default();
        let config = LstmConfig::new(3, 4).with_cache_mode(cache_mode);
        GravesLstm::new(config, &device)
    }

    fn random_input(batch: usize, n_in: usize, t: usize) -> Tensor<Backend, 3> {
        let device = Default::default();
        Tensor::random([batch, n_in, t], Distribution::Uniform(-1.0, 1.0), &device)
    }

    #[test]
    fn test_activate_output_shape() {
        let mut lstm = layer(CacheMode::None);
        let out = lstm.activate(&random_input(2, 3, 6), false).unwrap();
        assert_eq!(out.dims(), [2, 4, 6]);
    }

    #[test]
    fn test_pretraining_gradient_unsupported() {
        let lstm = layer(CacheMode::None);
        assert!(matches!(
            lstm.gradient(),
            Err(LstmError::UnsupportedOperation { op: "gradient", .. })
        ));
    }

    #[test]
    fn test_backprop_without_forward_fails() {
        let device = Default::default();
        let mut lstm = layer(CacheMode::None);
        let epsilon = Tensor::zeros([2, 4, 6], &device);
        let mut grads = LstmGradients::zeros(lstm.config(), &device);
        assert!(matches!(
            lstm.backprop_gradient(&epsilon, &mut grads),
            Err(LstmError::StateMismatch(_))
        ));
    }

    #[test]
    fn test_training_activate_populates_cache_and_backward_consumes_it() {
        let device = Default::default();
        let mut lstm = layer(CacheMode::Enabled);
        let input = random_input(2, 3, 5);

        lstm.activate(&input, true).unwrap();
        assert!(lstm.has_cached_fwd_pass());

        let epsilon = Tensor::random([2, 4, 5], Distribution::Uniform(-1.0, 1.0), &device);
        let mut grads = LstmGradients::zeros(lstm.config(), &device);
        lstm.backprop_gradient(&epsilon, &mut grads).unwrap();
        assert!(!lstm.has_cached_fwd_pass(), "cache must be single-use");
    }

    #[test]
    fn test_inference_activate_never_populates_cache() {
        let mut lstm = layer(CacheMode::Enabled);
        lstm.activate(&random_input(2, 3, 5), false).unwrap();
        assert!(!lstm.has_cached_fwd_pass());
    }

    #[test]
    fn test_fresh_forward_invalidates_waiting_bundle() {
        let mut lstm = layer(CacheMode::Enabled);
        lstm.activate(&random_input(2, 3, 5), true).unwrap();
        assert!(lstm.has_cached_fwd_pass());

        // An inference pass in between must not leave the old bundle around.
        lstm.activate(&random_input(2, 3, 7), false).unwrap();
        assert!(!lstm.has_cached_fwd_pass());
    }

    #[test]
    fn test_mask_passthrough_identity() {
        let device = Default::default();
        let lstm = layer(CacheMode::None);
        let mask = Tensor::<Backend, 2>::from_floats([[1.0, 1.0, 0.0]], &device);

        for state in [MaskState::Active, MaskState::Passthrough] {
            let (returned, new_state) = lstm.feed_forward_mask_array(mask.clone(), state, 1);
            assert_eq!(new_state, MaskState::Passthrough);
            let diff = (returned - mask.clone()).abs().sum().into_scalar();
            assert_eq!(diff, 0.0);
        }
    }

    #[test]
    fn test_weight_noise_held_across_pass_then_cleared() {
        let device = Default::default();
        let mut lstm =
            layer(CacheMode::None).with_weight_noise(WeightNoise::Additive { stddev: 0.5 });
        let input = random_input(1, 3, 4);

        // Two training forwards without a backward in between see the same
        // noised weights.
        let out1 = lstm.activate(&input, true).unwrap();
        let out2 = lstm.activate(&input, true).unwrap();
        let diff = (out1.clone() - out2).abs().sum().into_scalar();
        assert_eq!(diff, 0.0);

        // Backward clears the noised view, so the next pass resamples.
        let epsilon = Tensor::random([1, 4, 4], Distribution::Uniform(-1.0, 1.0), &device);
        let mut grads = LstmGradients::zeros(lstm.config(), &device);
        lstm.backprop_gradient(&epsilon, &mut grads).unwrap();

        let out3 = lstm.activate(&input, true).unwrap();
        let diff = (out1 - out3).abs().sum().into_scalar();
        assert!(diff > 0.0, "noise must be resampled after backward");
    }

    #[test]
    fn test_set_params_rejects_wrong_shapes() {
        let device = Default::default();
        let mut lstm = layer(CacheMode::None);
        let other = LstmParams::<Backend>::init(&LstmConfig::new(5, 9), &device);
        assert!(matches!(
            lstm.set_params(other),
            Err(LstmError::DimensionMismatch { .. })
        ));
    }
}
