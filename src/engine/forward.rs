//! Forward-pass engine: gate and cell-state activations over one sequence.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::config::LstmConfig;
use crate::engine::fwd_pass::{FwdPassReturn, FwdPassTrace};
use crate::error::{LstmError, Result};
use crate::params::LstmParams;

/// Run the gated memory cell over a full input sequence.
///
/// Per step `t` (vectorized over the batch):
///
/// ```text
/// zI = x_t W_i + h_{t-1} R_i + c_{t-1} p_i + b_i      i = gate(zI)
/// zF = x_t W_f + h_{t-1} R_f + c_{t-1} p_f + b_f      f = gate(zF)
/// zO = x_t W_o + h_{t-1} R_o + c_{t-1} p_o + b_o      o = gate(zO)
/// zG = x_t W_g + h_{t-1} R_g + b_g                    g = act(zG)
/// c_t = f * c_{t-1} + i * g
/// h_t = o * act(c_t)
/// ```
///
/// All three peephole terms read the *previous* cell state, so every peephole
/// gradient flows into `dc_{t-1}` during the backward pass.
///
/// # Arguments
/// * `input` - `[batch, n_in, T]` input sequence
/// * `prev_act`, `prev_mem_cell` - optional initial `(h, c)`, zeros if absent
/// * `mask` - optional `[batch, T]` 0/1 validity mask; at invalid steps the
///   carried state freezes (repeats the previous step) and the emitted output
///   is zero, so padding neither corrupts the recurrence nor produces output
/// * `retain_for_backprop` - whether to keep the full per-step trace
///
/// The engine is side-effect free: it neither reads nor writes the layer's
/// cache or state tables.
pub fn activate_sequence<B: Backend>(
    config: &LstmConfig,
    params: &LstmParams<B>,
    input: &Tensor<B, 3>,
    prev_act: Option<Tensor<B, 2>>,
    prev_mem_cell: Option<Tensor<B, 2>>,
    mask: Option<&Tensor<B, 2>>,
    retain_for_backprop: bool,
) -> Result<FwdPassReturn<B>> {
    let h = config.hidden_size;
    let [batch, n_in, seq_len] = input.dims();
    let device = input.device();

    params.shape_check(config)?;
    if seq_len == 0 {
        return Err(LstmError::DimensionMismatch {
            what: "input",
            expected: "at least one time step".into(),
            actual: format!("{:?}", input.dims()),
        });
    }
    if n_in != config.input_size {
        return Err(LstmError::dims(
            "input features",
            &[batch, config.input_size, seq_len],
            &[batch, n_in, seq_len],
        ));
    }
    if let Some(m) = mask {
        let dims = m.dims();
        if dims != [batch, seq_len] {
            return Err(LstmError::dims("mask", &[batch, seq_len], &dims));
        }
    }
    for (name, state) in [("previous activation", &prev_act), ("previous memory cell", &prev_mem_cell)] {
        if let Some(s) = state {
            let dims = s.dims();
            if dims != [batch, h] {
                return Err(LstmError::dims(name, &[batch, h], &dims));
            }
        }
    }
    if retain_for_backprop
        && !(config.gate_activation.supports_backprop() && config.activation.supports_backprop())
    {
        return Err(LstmError::UnsupportedConfiguration(format!(
            "activation pair ({:?}, {:?}) has no derivative usable by the backward pass",
            config.gate_activation, config.activation
        )));
    }

    let rec_gates = params.recurrent_gate_weights(h);
    let peep_i = params.peephole_row(h, 0);
    let peep_f = params.peephole_row(h, 1);
    let peep_o = params.peephole_row(h, 2);
    let bias_row: Tensor<B, 2> = params.bias.clone().unsqueeze();

    let mut h_prev = prev_act.unwrap_or_else(|| Tensor::zeros([batch, h], &device));
    let mut c_prev = prev_mem_cell.unwrap_or_else(|| Tensor::zeros([batch, h], &device));
    let init_act = h_prev.clone();
    let init_mem_cell = c_prev.clone();

    let mut outputs: Vec<Tensor<B, 2>> = Vec::with_capacity(seq_len);
    let mut pre_gates: Vec<Tensor<B, 2>> = Vec::new();
    let mut gates: Vec<Tensor<B, 2>> = Vec::new();
    let mut mem_cells: Vec<Tensor<B, 2>> = Vec::new();
    let mut activations: Vec<Tensor<B, 2>> = Vec::new();

    for t in 0..seq_len {
        // x_t: [batch, 1, n_in] -> [batch, n_in]
        let x_t = input.clone().narrow(2, t, 1).squeeze(2);

        // All four gate pre-activations at once: [batch, 4H], then the
        // peephole contributions into the i/f/o blocks (the modulation gate
        // has no peephole term).
        let peephole = Tensor::cat(
            vec![
                c_prev.clone() * peep_i.clone(),
                c_prev.clone() * peep_f.clone(),
                c_prev.clone() * peep_o.clone(),
                Tensor::zeros([batch, h], &device),
            ],
            1,
        );
        let z = x_t.matmul(params.input_weights.clone())
            + h_prev.clone().matmul(rec_gates.clone())
            + bias_row.clone()
            + peephole;

        let z_ifo = z.clone().slice([0..batch, 0..3 * h]);
        let z_g = z.clone().slice([0..batch, 3 * h..4 * h]);
        let a = Tensor::cat(
            vec![
                config.gate_activation.apply(z_ifo),
                config.activation.apply(z_g),
            ],
            1,
        );

        let chunks = a.clone().chunk(4, 1);
        let i_t = chunks[0].clone();
        let f_t = chunks[1].clone();
        let o_t = chunks[2].clone();
        let g_t = chunks[3].clone();

        let c_t = f_t * c_prev.clone() + i_t * g_t;
        let h_t = o_t * config.activation.apply(c_t.clone());

        let (h_carry, c_carry, out_t) = match mask {
            Some(m) => {
                let keep = m.clone().narrow(1, t, 1); // [batch, 1], broadcast over H
                let hold = keep.ones_like() - keep.clone();
                let c_carry = c_t * keep.clone() + c_prev.clone() * hold.clone();
                let h_carry = h_t.clone() * keep.clone() + h_prev.clone() * hold;
                (h_carry, c_carry, h_t * keep)
            }
            None => (h_t.clone(), c_t, h_t),
        };

        outputs.push(out_t);
        if retain_for_backprop {
            pre_gates.push(z);
            gates.push(a);
            mem_cells.push(c_carry.clone());
            activations.push(h_carry.clone());
        }
        h_prev = h_carry;
        c_prev = c_carry;
    }

    let output = Tensor::stack(outputs, 2); // [batch, H, T]

    let trace = retain_for_backprop.then(|| FwdPassTrace {
        pre_gates,
        gates,
        mem_cells,
        activations,
        prev_act: init_act,
        prev_mem_cell: init_mem_cell,
    });

    // The snapshots are the final carried slice, never recomputed.
    Ok(FwdPassReturn {
        output,
        last_act: h_prev,
        last_mem_cell: c_prev,
        trace,
    })
}
