//! The forward/backward computation core.
//!
//! [`forward::activate_sequence`] unrolls the gated memory cell over the time
//! dimension of one input sequence and packages the intermediates required by
//! backpropagation-through-time into a [`fwd_pass::FwdPassReturn`].
//! [`backward::backprop_gradient_helper`] walks that bundle in reverse time
//! order and accumulates parameter gradients plus the gradient with respect
//! to the layer input.
//!
//! Both engines are pure functions of their arguments: they never touch the
//! layer's cache or its recurrent state tables. The stateful orchestration
//! lives in [`crate::layer`].

pub mod backward;
pub mod forward;
pub mod fwd_pass;

pub use backward::backprop_gradient_helper;
pub use forward::activate_sequence;
pub use fwd_pass::{FwdPassReturn, FwdPassTrace};
