//! Error taxonomy for the LSTM layer.
//!
//! Every failure mode is surfaced as a typed [`LstmError`] value so callers
//! can branch on the error kind. All variants are fatal to the current call:
//! no partial results are produced and nothing is retried internally.

/// Errors produced by the forward/backward engines and the layer wrapper.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LstmError {
    /// An operation with no defined semantics in this layer's mode, e.g. a
    /// layer-wise pretraining gradient request.
    #[error("unsupported operation `{op}`: {reason}")]
    UnsupportedOperation { op: &'static str, reason: String },

    /// Shape inconsistency between weights, biases, input or mask.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: String,
        actual: String,
    },

    /// Time-length or batch inconsistency between the epsilon, the stored
    /// input and the trajectory bundle, or a missing/expired bundle.
    #[error("state mismatch: {0}")]
    StateMismatch(String),

    /// A configured activation function cannot satisfy the requirements of
    /// the backward pass.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
}

impl LstmError {
    pub(crate) fn dims(what: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        LstmError::DimensionMismatch {
            what,
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, LstmError>;
