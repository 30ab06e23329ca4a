//! Mask-forwarding policy.

/// How masking applies to the data a layer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MaskState {
    /// Downstream consumers must apply the mask to this layer's output.
    Active,
    /// Masking effects are already handled inside this layer's own
    /// forward/backward computation; downstream layers need not reapply the
    /// mask to its output.
    Passthrough,
}
