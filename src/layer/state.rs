//! Recurrent state tables.
//!
//! A layer owns two independent [`RnnStateMap`]s: one for streaming
//! inference (`rnn_time_step`) and one for truncated-BPTT continuation
//! across training segments. The two call paths never read or write each
//! other's table; mixing them would conflate inference rollout with
//! training-time sequence continuation.

use std::collections::HashMap;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Keys into a recurrent state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StateKey {
    /// Hidden activation of the last processed step.
    PrevActivation,
    /// Memory cell state of the last processed step.
    PrevMemCell,
}

/// A named mapping from state key to `[batch, H]` tensor.
///
/// Created empty at layer construction; an absent entry means "start from a
/// zero initial state". Entries are only removed by an explicit
/// [`RnnStateMap::clear`].
#[derive(Debug, Clone)]
pub struct RnnStateMap<B: Backend> {
    entries: HashMap<StateKey, Tensor<B, 2>>,
}

impl<B: Backend> RnnStateMap<B> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Fetch a state entry, if one has been stored.
    pub fn get(&self, key: StateKey) -> Option<Tensor<B, 2>> {
        self.entries.get(&key).cloned()
    }

    /// Store a state entry, taking ownership of the tensor.
    pub fn put(&mut self, key: StateKey, value: Tensor<B, 2>) {
        self.entries.insert(key, value);
    }

    /// Drop all entries, returning the table to the zero-initial-state
    /// condition.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<B: Backend> Default for RnnStateMap<B> {
    fn default() -> Self {
        Self::new()
    }
}
