//! Pre-norm residual transformer block.

use ndarray::{Array2, Array3, ArrayBase, ArrayViewD, ArrayViewMutD, Data, Ix2};
use rand::Rng;

use crate::attention::MultiHeadSelfAttention;
use crate::config::ViTConfig;
use crate::error::Result;
use crate::feed_forward::FeedForward;
use crate::nn::{LayerNorm, Mode, Parameters, param_key};

/// `x + attn(norm(x))`, then `x + ff(norm(x))`.
#[derive(Debug, Clone)]
pub struct TransformerBlock {
    attn_norm: LayerNorm,
    attn: MultiHeadSelfAttention,
    ff_norm: LayerNorm,
    ff: FeedForward,
}

impl TransformerBlock {
    pub fn new<R: Rng + ?Sized>(config: &ViTConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            attn_norm: LayerNorm::new(config.dim, config.layer_norm_eps),
            attn: MultiHeadSelfAttention::new(config, rng)?,
            ff_norm: LayerNorm::new(config.dim, config.layer_norm_eps),
            ff: FeedForward::new(config, rng)?,
        })
    }

    pub fn attention(&self) -> &MultiHeadSelfAttention {
        &self.attn
    }

    pub fn forward<S>(&self, x: &ArrayBase<S, Ix2>, mode: &mut Mode<'_>) -> Array2<f32>
    where
        S: Data<Elem = f32>,
    {
        let attended = self.attn.forward(&self.attn_norm.forward(x), mode);
        self.feed_forward(attended + x, mode)
    }

    /// Run the block, also returning its attention weights.
    pub fn forward_with_weights<S>(
        &self,
        x: &ArrayBase<S, Ix2>,
        mode: &mut Mode<'_>,
    ) -> (Array2<f32>, Array3<f32>)
    where
        S: Data<Elem = f32>,
    {
        let (attended, weights) = self
            .attn
            .forward_with_weights(&self.attn_norm.forward(x), mode);
        (self.feed_forward(attended + x, mode), weights)
    }

    /// Second residual sublayer.
    fn feed_forward(&self, residual: Array2<f32>, mode: &mut Mode<'_>) -> Array2<f32> {
        self.ff.forward(&self.ff_norm.forward(&residual), mode) + &residual
    }
}

impl Parameters for TransformerBlock {
    fn parameters(&self, prefix: &str) -> Vec<(String, ArrayViewD<'_, f32>)> {
        let mut out = self.attn_norm.parameters(&param_key(prefix, "attn_norm"));
        out.extend(self.attn.parameters(&param_key(prefix, "attn")));
        out.extend(self.ff_norm.parameters(&param_key(prefix, "ff_norm")));
        out.extend(self.ff.parameters(&param_key(prefix, "ff")));
        out
    }

    fn parameters_mut(&mut self, prefix: &str) -> Vec<(String, ArrayViewMutD<'_, f32>)> {
        let mut out = self.attn_norm.parameters_mut(&param_key(prefix, "attn_norm"));
        out.extend(self.attn.parameters_mut(&param_key(prefix, "attn")));
        out.extend(self.ff_norm.parameters_mut(&param_key(prefix, "ff_norm")));
        out.extend(self.ff.parameters_mut(&param_key(prefix, "ff")));
        out
    }
}
