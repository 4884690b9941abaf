//! Building blocks shared by every ViT component.

mod functional;
mod linear;
mod mode;
mod norm;

pub use functional::softmax_rows;
pub use linear::Linear;
pub use mode::Mode;
pub use norm::LayerNorm;

use ndarray::{ArrayViewD, ArrayViewMutD};

/// Stable-keyed access to the learned tensors of a component.
///
/// Keys are dotted paths built from `prefix`, e.g. `encoder.blocks.0.attn.qkv.weight`.
/// Read access hands out views; write access requires `&mut self`, so no
/// forward pass can observe a tensor while it is being updated.
pub trait Parameters {
    /// Every learned tensor of this component, in a fixed order.
    fn parameters(&self, prefix: &str) -> Vec<(String, ArrayViewD<'_, f32>)>;

    /// Mutable views over the same tensors, in the same order.
    fn parameters_mut(&mut self, prefix: &str) -> Vec<(String, ArrayViewMutD<'_, f32>)>;

    /// Total number of learned scalars.
    fn num_parameters(&self) -> usize {
        self.parameters("").iter().map(|(_, p)| p.len()).sum()
    }
}

/// Join a parent prefix and a child name into a parameter key.
pub(crate) fn param_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
