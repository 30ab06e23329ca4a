//! Sequence training demo.
//!
//! Trains a small Graves LSTM to reproduce a delayed copy of its input
//! signal, using the hand-derived backward pass and plain SGD. The second
//! half of the demo runs the same task as truncated BPTT over consecutive
//! segments with the continuation state carried between them.

use burn::backend::NdArray;
use burn::tensor::{Distribution, Tensor};
use graves_lstm::prelude::*;

type Backend = NdArray<f32>;

const SEQ_LEN: usize = 24;
const BATCH: usize = 8;
const INPUT: usize = 4;
const HIDDEN: usize = 12;
const LEARNING_RATE: f64 = 0.05;

/// Sum-of-squares loss and its gradient with respect to the prediction.
fn mse(prediction: &Tensor<Backend, 3>, target: &Tensor<Backend, 3>) -> (f32, Tensor<Backend, 3>) {
    let diff = prediction.clone() - target.clone();
    let n = diff.dims().iter().product::<usize>() as f32;
    let loss = (diff.clone() * diff.clone()).sum().into_scalar() / n;
    (loss, diff.mul_scalar(2.0 / n as f64))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Graves LSTM sequence training demo ===\n");

    let device = Default::default();
    let config = LstmConfig::new(INPUT, HIDDEN).with_cache_mode(CacheMode::Enabled);
    let mut lstm = GravesLstm::<Backend>::new(config, &device);
    // Read out the hidden state with a fixed projection so the task has a
    // well-defined target dimensionality.
    let readout: Tensor<Backend, 2> =
        Tensor::random([HIDDEN, INPUT], Distribution::Uniform(-0.5, 0.5), &device);

    // Task: reproduce the input delayed by one step.
    let input: Tensor<Backend, 3> = Tensor::random(
        [BATCH, INPUT, SEQ_LEN],
        Distribution::Uniform(-1.0, 1.0),
        &device,
    );
    let mut target = input.clone().narrow(2, 0, SEQ_LEN - 1);
    target = Tensor::cat(
        vec![Tensor::zeros([BATCH, INPUT, 1], &device), target],
        2,
    );

    println!("Full-length BPTT, {} epochs:", 60);
    for epoch in 0..60 {
        let hidden = lstm.activate(&input, true).unwrap();

        // Project every step through the readout: [batch, INPUT, T].
        let prediction = project(&hidden, &readout);
        let (loss, dloss) = mse(&prediction, &target);

        // Chain the loss gradient back through the readout into dL/dh.
        let epsilon = project_back(&dloss, &readout);

        let mut grads = LstmGradients::zeros(lstm.config(), &device);
        lstm.backprop_gradient(&epsilon, &mut grads).unwrap();
        let updated = grads.apply_sgd(lstm.params(), LEARNING_RATE);
        lstm.set_params(updated).unwrap();

        if epoch % 10 == 0 {
            println!("  epoch {epoch:>3}  loss {loss:.6}");
        }
    }
    println!();

    // The same sequence trained as three segments of 8 steps, with the
    // hidden state carried across segment boundaries.
    println!("Truncated BPTT over 3 segments of 8 steps:");
    let config = LstmConfig::new(INPUT, HIDDEN).with_cache_mode(CacheMode::Enabled);
    let mut lstm = GravesLstm::<Backend>::new(config, &device);

    for epoch in 0..60 {
        lstm.rnn_clear_previous_state();
        lstm.rnn_clear_tbptt_state();
        let mut epoch_loss = 0.0;

        for segment in 0..3 {
            let seg_input = input.clone().narrow(2, segment * 8, 8);
            let seg_target = target.clone().narrow(2, segment * 8, 8);

            // Forward seeded from the stored state; the trajectory bundle is
            // cached for the truncated backward pass right below.
            let hidden = lstm
                .rnn_activate_using_stored_state(&seg_input, true, true)
                .unwrap();
            let prediction = project(&hidden, &readout);
            let (loss, dloss) = mse(&prediction, &seg_target);
            epoch_loss += loss;

            let epsilon = project_back(&dloss, &readout);
            let mut grads = LstmGradients::zeros(lstm.config(), &device);
            lstm.tbptt_backprop_gradient(&epsilon, 8, &mut grads)
                .unwrap();
            let updated = grads.apply_sgd(lstm.params(), LEARNING_RATE);
            lstm.set_params(updated).unwrap();

            // Roll the continuation state into the stored state for the next
            // segment's forward pass.
            let state = lstm.rnn_get_tbptt_state();
            let (h, c) = (
                state.get(StateKey::PrevActivation).unwrap(),
                state.get(StateKey::PrevMemCell).unwrap(),
            );
            lstm.rnn_set_previous_state(h, c);
        }

        if epoch % 10 == 0 {
            println!("  epoch {epoch:>3}  loss {:.6}", epoch_loss / 3.0);
        }
    }

    println!("\nDone.");
}

/// `[batch, H, T] x [H, OUT] -> [batch, OUT, T]`, applied per step.
fn project(hidden: &Tensor<Backend, 3>, readout: &Tensor<Backend, 2>) -> Tensor<Backend, 3> {
    let [_, _, seq_len] = hidden.dims();
    let steps: Vec<Tensor<Backend, 2>> = (0..seq_len)
        .map(|t| {
            hidden
                .clone()
                .narrow(2, t, 1)
                .squeeze::<2>(2)
                .matmul(readout.clone())
        })
        .collect();
    Tensor::stack(steps, 2)
}

/// Adjoint of [`project`]: `[batch, OUT, T] -> [batch, H, T]`.
fn project_back(dloss: &Tensor<Backend, 3>, readout: &Tensor<Backend, 2>) -> Tensor<Backend, 3> {
    let [_, _, seq_len] = dloss.dims();
    let steps: Vec<Tensor<Backend, 2>> = (0..seq_len)
        .map(|t| {
            dloss
                .clone()
                .narrow(2, t, 1)
                .squeeze::<2>(2)
                .matmul(readout.clone().transpose())
        })
        .collect();
    Tensor::stack(steps, 2)
}
