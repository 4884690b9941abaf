use ndarray::{ArrayBase, DataMut, Ix2};

use crate::config::Activation;

/// Softmax over the last axis of a matrix, in place.
///
/// The row maximum is subtracted before exponentiation so large scores do
/// not overflow.
pub fn softmax_rows<S>(x: &mut ArrayBase<S, Ix2>)
where
    S: DataMut<Elem = f32>,
{
    for mut row in x.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
}

impl Activation {
    /// Apply the activation to a single value.
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Gelu => gelu(x),
            Activation::Silu => x / (1.0 + (-x).exp()),
        }
    }
}

/// GELU, tanh approximation.
fn gelu(x: f32) -> f32 {
    const SQRT_2_OVER_PI: f32 = 0.797_884_6;
    0.5 * x * (1.0 + (SQRT_2_OVER_PI * (x + 0.044_715 * x * x * x)).tanh())
}
