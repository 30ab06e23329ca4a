//! Backward-pass engine: BPTT over a retained trajectory bundle.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::config::LstmConfig;
use crate::engine::fwd_pass::FwdPassReturn;
use crate::error::{LstmError, Result};
use crate::gradient::LstmGradients;
use crate::params::LstmParams;

/// Walk one trajectory bundle in reverse time order and accumulate gradients.
///
/// `epsilon` is `dL/dh`, `[batch, H, T]`. Parameter gradients are *added
/// into* `grads`; the returned tensor is the gradient with respect to the
/// layer input, `[batch, n_in, T]`.
///
/// With `truncated` set, iteration stops after `tbptt_length` steps counted
/// from the end of the segment. Steps before the truncation window contribute
/// nothing: their slice of the input gradient stays zero and no parameter
/// gradient is accumulated for them.
///
/// Masked steps mirror the forward pass's state freeze exactly: their own
/// gate, parameter and input gradients are zero, while the recurrent carries
/// `dh`/`dc` pass through to the previous step unchanged.
pub fn backprop_gradient_helper<B: Backend>(
    config: &LstmConfig,
    params: &LstmParams<B>,
    input: &Tensor<B, 3>,
    epsilon: &Tensor<B, 3>,
    fwd_pass: &FwdPassReturn<B>,
    truncated: bool,
    tbptt_length: usize,
    mask: Option<&Tensor<B, 2>>,
    grads: &mut LstmGradients<B>,
) -> Result<Tensor<B, 3>> {
    let h = config.hidden_size;
    let [batch, n_in, seq_len] = input.dims();
    let device = input.device();

    params.shape_check(config)?;
    grads.shape_check(config)?;

    let eps_dims = epsilon.dims();
    if eps_dims[1] != h {
        return Err(LstmError::dims("epsilon", &[batch, h, seq_len], &eps_dims));
    }
    if eps_dims[0] != batch || eps_dims[2] != seq_len {
        return Err(LstmError::StateMismatch(format!(
            "epsilon covers [batch, T] = [{}, {}] but the input covers [{}, {}]",
            eps_dims[0], eps_dims[2], batch, seq_len
        )));
    }
    let trace = fwd_pass.trace.as_ref().ok_or_else(|| {
        LstmError::StateMismatch(
            "trajectory bundle was not retained for backprop; rerun the forward pass with \
             retain_for_backprop"
                .into(),
        )
    })?;
    if trace.mem_cells.len() != seq_len || fwd_pass.batch_size() != batch {
        return Err(LstmError::StateMismatch(format!(
            "trajectory bundle covers [batch, T] = [{}, {}] but this call covers [{}, {}]",
            fwd_pass.batch_size(),
            trace.mem_cells.len(),
            batch,
            seq_len
        )));
    }
    if let Some(m) = mask {
        let dims = m.dims();
        if dims != [batch, seq_len] {
            return Err(LstmError::dims("mask", &[batch, seq_len], &dims));
        }
    }

    let rec_gates = params.recurrent_gate_weights(h);
    let peep_i = params.peephole_row(h, 0);
    let peep_f = params.peephole_row(h, 1);
    let peep_o = params.peephole_row(h, 2);

    let start = if truncated {
        seq_len.saturating_sub(tbptt_length)
    } else {
        0
    };

    // Segment accumulators; folded into `grads` additively at the end.
    let mut dw_input = Tensor::zeros([n_in, 4 * h], &device);
    let mut dw_rec = Tensor::zeros([h, 4 * h], &device);
    let mut db: Tensor<B, 2> = Tensor::zeros([1, 4 * h], &device);
    let mut dp_i: Tensor<B, 2> = Tensor::zeros([1, h], &device);
    let mut dp_f: Tensor<B, 2> = Tensor::zeros([1, h], &device);
    let mut dp_o: Tensor<B, 2> = Tensor::zeros([1, h], &device);

    // Input gradient slices; steps before the truncation window stay zero.
    let mut dx_steps: Vec<Tensor<B, 2>> = (0..seq_len)
        .map(|_| Tensor::zeros([batch, n_in], &device))
        .collect();

    let mut dh_carry: Tensor<B, 2> = Tensor::zeros([batch, h], &device);
    let mut dc_carry: Tensor<B, 2> = Tensor::zeros([batch, h], &device);

    for t in (start..seq_len).rev() {
        let x_t = input.clone().narrow(2, t, 1).squeeze(2);
        let c_t = trace.mem_cells[t].clone();
        let (h_prev, c_prev) = if t == 0 {
            (trace.prev_act.clone(), trace.prev_mem_cell.clone())
        } else {
            (trace.activations[t - 1].clone(), trace.mem_cells[t - 1].clone())
        };

        let gate_chunks = trace.gates[t].clone().chunk(4, 1);
        let (i_t, f_t, o_t, g_t) = (
            gate_chunks[0].clone(),
            gate_chunks[1].clone(),
            gate_chunks[2].clone(),
            gate_chunks[3].clone(),
        );
        let pre_chunks = trace.pre_gates[t].clone().chunk(4, 1);
        let (z_i, z_f, z_o, z_g) = (
            pre_chunks[0].clone(),
            pre_chunks[1].clone(),
            pre_chunks[2].clone(),
            pre_chunks[3].clone(),
        );

        let keep = mask.map(|m| m.clone().narrow(1, t, 1)); // [batch, 1]

        let mut eps_t = epsilon.clone().narrow(2, t, 1).squeeze(2);
        if let Some(k) = &keep {
            eps_t = eps_t * k.clone();
        }

        let dh = eps_t + dh_carry.clone();

        // Through h_t = o_t * act(c_t).
        let c_act = config.activation.apply(c_t.clone());
        let dz_o = config.gate_activation.backprop(
            z_o,
            o_t.clone(),
            dh.clone() * c_act.clone(),
        );
        let dc = config
            .activation
            .backprop(c_t, c_act, dh.clone() * o_t)
            + dc_carry.clone();

        // Through c_t = f_t * c_{t-1} + i_t * g_t.
        let dz_g = config
            .activation
            .backprop(z_g, g_t.clone(), dc.clone() * i_t.clone());
        let dz_i = config
            .gate_activation
            .backprop(z_i, i_t, dc.clone() * g_t);
        let dz_f = config
            .gate_activation
            .backprop(z_f, f_t.clone(), dc.clone() * c_prev.clone());

        // A masked step contributes no gradient of its own.
        let (dz_i, dz_f, dz_o, dz_g) = match &keep {
            Some(k) => (
                dz_i * k.clone(),
                dz_f * k.clone(),
                dz_o * k.clone(),
                dz_g * k.clone(),
            ),
            None => (dz_i, dz_f, dz_o, dz_g),
        };
        let dz = Tensor::cat(
            vec![dz_i.clone(), dz_f.clone(), dz_o.clone(), dz_g],
            1,
        );

        // Recurrent carries into step t-1. At a masked step the forward
        // carry was the identity, so its adjoint is the identity too.
        let mut dh_next = dz.clone().matmul(rec_gates.clone().transpose());
        let mut dc_next = dc.clone() * f_t
            + dz_i.clone() * peep_i.clone()
            + dz_f.clone() * peep_f.clone()
            + dz_o.clone() * peep_o.clone();
        if let Some(k) = &keep {
            let hold = k.ones_like() - k.clone();
            dh_next = dh_next * k.clone() + dh * hold.clone();
            dc_next = dc_next * k.clone() + dc_carry * hold;
        }

        // Outer products, summed over the batch.
        dw_input = dw_input + x_t.clone().transpose().matmul(dz.clone());
        dw_rec = dw_rec + h_prev.transpose().matmul(dz.clone());
        db = db + dz.clone().sum_dim(0);
        dp_i = dp_i + (dz_i * c_prev.clone()).sum_dim(0);
        dp_f = dp_f + (dz_f * c_prev.clone()).sum_dim(0);
        dp_o = dp_o + (dz_o * c_prev).sum_dim(0);

        dx_steps[t] = dz.matmul(params.input_weights.clone().transpose());

        dh_carry = dh_next;
        dc_carry = dc_next;
    }

    let input_grad = Tensor::stack(dx_steps, 2); // [batch, n_in, T]

    // Fold the segment into the caller's buffers (additive contract).
    let dw_rec_full = Tensor::zeros([h, 4 * h + 3], &device)
        .slice_assign([0..h, 0..4 * h], dw_rec)
        .slice_assign([0..h, 4 * h..4 * h + 1], dp_i.transpose())
        .slice_assign([0..h, 4 * h + 1..4 * h + 2], dp_f.transpose())
        .slice_assign([0..h, 4 * h + 2..4 * h + 3], dp_o.transpose());
    grads.accumulate(dw_input, dw_rec_full, db.squeeze(0));

    Ok(input_grad)
}
