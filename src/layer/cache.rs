//! One-slot hand-off buffer between a training forward pass and the
//! immediately following backward pass.

use burn::tensor::backend::Backend;

use crate::engine::fwd_pass::FwdPassReturn;

/// Holds at most one trajectory bundle.
///
/// This is not a memo cache: it exists solely so that a `forward → backward`
/// pair on the same sequence can skip the recomputation the backward pass
/// would otherwise need. Storing overwrites any previous bundle, and taking
/// clears the slot, so a bundle can be consumed exactly once.
#[derive(Debug)]
pub struct FwdPassCache<B: Backend> {
    slot: Option<FwdPassReturn<B>>,
}

impl<B: Backend> FwdPassCache<B> {
    pub fn new() -> Self {
        Self { slot: None }
    }

    /// Retain a bundle, replacing any previous one.
    pub fn store(&mut self, bundle: FwdPassReturn<B>) {
        self.slot = Some(bundle);
    }

    /// Return and clear the bundle if one is waiting.
    pub fn take_if_present(&mut self) -> Option<FwdPassReturn<B>> {
        self.slot.take()
    }

    /// Drop any waiting bundle without consuming it.
    pub fn clear(&mut self) {
        self.slot = None;
    }

    pub fn is_present(&self) -> bool {
        self.slot.is_some()
    }
}

impl<B: Backend> Default for FwdPassCache<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Tensor;

    type Backend = NdArray<f32>;

    fn bundle(value: f32) -> FwdPassReturn<Backend> {
        let device = Default::default();
        FwdPassReturn {
            output: Tensor::full([1, 2, 3], value, &device),
            last_act: Tensor::full([1, 2], value, &device),
            last_mem_cell: Tensor::full([1, 2], value, &device),
            trace: None,
        }
    }

    #[test]
    fn test_take_consumes_the_slot() {
        let mut cache = FwdPassCache::new();
        assert!(!cache.is_present());

        cache.store(bundle(1.0));
        assert!(cache.is_present());

        assert!(cache.take_if_present().is_some());
        assert!(!cache.is_present());
        assert!(cache.take_if_present().is_none());
    }

    #[test]
    fn test_store_overwrites() {
        let mut cache = FwdPassCache::new();
        cache.store(bundle(1.0));
        cache.store(bundle(2.0));

        let taken = cache.take_if_present().expect("slot must be occupied");
        assert_eq!(taken.output.mean().into_scalar(), 2.0);
    }
}
