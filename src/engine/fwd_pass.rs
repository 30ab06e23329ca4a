//! The trajectory bundle produced by one forward pass.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Per-time-step intermediates retained for an exact backward pass.
///
/// Gate values are stored as concatenated `[batch, 4H]` blocks in the packed
/// column order `[input, forget, output, modulation]`, matching the parameter
/// layout. `mem_cells` and `activations` hold the *carried* cell and hidden
/// state per step: under masking these repeat the previous step's value at
/// invalid positions, so indexing `t - 1` always yields the state the
/// recurrence actually consumed at step `t`.
#[derive(Debug, Clone)]
pub struct FwdPassTrace<B: Backend> {
    /// Gate pre-activations per step, each `[batch, 4H]`.
    pub pre_gates: Vec<Tensor<B, 2>>,
    /// Gate activations per step, each `[batch, 4H]`.
    pub gates: Vec<Tensor<B, 2>>,
    /// Carried cell state per step, each `[batch, H]`.
    pub mem_cells: Vec<Tensor<B, 2>>,
    /// Carried hidden state per step, each `[batch, H]`.
    pub activations: Vec<Tensor<B, 2>>,
    /// Hidden state the sequence started from, `[batch, H]`.
    pub prev_act: Tensor<B, 2>,
    /// Cell state the sequence started from, `[batch, H]`.
    pub prev_mem_cell: Tensor<B, 2>,
}

/// Everything one forward pass produces.
///
/// `last_act` and `last_mem_cell` are snapshots of the final carried time
/// slice, never recomputed independently, so under masking they hold the
/// state of the last *valid* step. The trace is only present when the pass
/// was asked to retain intermediates for backprop.
#[derive(Debug, Clone)]
pub struct FwdPassReturn<B: Backend> {
    /// Output activations, `[batch, H, T]`. Masked steps emit zeros.
    pub output: Tensor<B, 3>,
    /// Final hidden state, `[batch, H]`.
    pub last_act: Tensor<B, 2>,
    /// Final cell state, `[batch, H]`.
    pub last_mem_cell: Tensor<B, 2>,
    /// Retained intermediates, present iff the pass ran for backprop.
    pub trace: Option<FwdPassTrace<B>>,
}

impl<B: Backend> FwdPassReturn<B> {
    /// Number of time steps this bundle covers.
    pub fn seq_len(&self) -> usize {
        self.output.dims()[2]
    }

    /// Batch size this bundle covers.
    pub fn batch_size(&self) -> usize {
        self.output.dims()[0]
    }
}
