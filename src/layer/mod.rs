//! The stateful layer wrapping the computation engines.
//!
//! [`GravesLstm`] owns the parameters, the one-slot forward-pass cache and
//! the two recurrent state tables, and orchestrates the engines in
//! [`crate::engine`] behind the training/inference entry points.

pub mod cache;
pub mod graves_lstm;
pub mod mask;
pub mod state;

pub use cache::FwdPassCache;
pub use graves_lstm::GravesLstm;
pub use mask::MaskState;
pub use state::{RnnStateMap, StateKey};
