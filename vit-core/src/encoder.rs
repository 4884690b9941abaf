//! Stack of transformer blocks.

use ndarray::{Array2, Array3, ArrayBase, ArrayViewD, ArrayViewMutD, Data, Ix2};
use rand::Rng;
use tracing::trace;

use crate::block::TransformerBlock;
use crate::config::ViTConfig;
use crate::error::Result;
use crate::nn::{Mode, Parameters, param_key};

/// `depth` blocks applied in order. With no blocks the encoder returns its
/// input unchanged.
#[derive(Debug, Clone)]
pub struct Encoder {
    blocks: Vec<TransformerBlock>,
}

impl Encoder {
    pub fn new<R: Rng + ?Sized>(config: &ViTConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        let blocks = (0..config.depth)
            .map(|_| TransformerBlock::new(config, rng))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { blocks })
    }

    pub fn depth(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[TransformerBlock] {
        &self.blocks
    }

    pub fn forward<S>(&self, x: &ArrayBase<S, Ix2>, mode: &mut Mode<'_>) -> Array2<f32>
    where
        S: Data<Elem = f32>,
    {
        self.blocks.iter().enumerate().fold(x.to_owned(), |x, (i, block)| {
            trace!(block = i, "encoder block");
            block.forward(&x, mode)
        })
    }

    /// Run every block, collecting each one's attention weights in order.
    pub fn forward_with_weights<S>(
        &self,
        x: &ArrayBase<S, Ix2>,
        mode: &mut Mode<'_>,
    ) -> (Array2<f32>, Vec<Array3<f32>>)
    where
        S: Data<Elem = f32>,
    {
        let mut hidden = x.to_owned();
        let mut weights = Vec::with_capacity(self.blocks.len());
        for (i, block) in self.blocks.iter().enumerate() {
            trace!(block = i, "encoder block");
            let (out, w) = block.forward_with_weights(&hidden, mode);
            hidden = out;
            weights.push(w);
        }
        (hidden, weights)
    }
}

impl Parameters for Encoder {
    fn parameters(&self, prefix: &str) -> Vec<(String, ArrayViewD<'_, f32>)> {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(i, block)| block.parameters(&param_key(prefix, &format!("blocks.{i}"))))
            .collect()
    }

    fn parameters_mut(&mut self, prefix: &str) -> Vec<(String, ArrayViewMutD<'_, f32>)> {
        self.blocks
            .iter_mut()
            .enumerate()
            .flat_map(|(i, block)| block.parameters_mut(&param_key(prefix, &format!("blocks.{i}"))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn encoder(depth: usize) -> Encoder {
        let config = ViTConfig::new(4, 2, 3, 8, depth, 2, 16, 0.0, 0.0);
        Encoder::new(&config, &mut StdRng::seed_from_u64(31)).unwrap()
    }

    #[test]
    fn test_depth_zero_is_identity() {
        let enc = encoder(0);
        assert_eq!(enc.depth(), 0);
        assert!(enc.parameters("encoder").is_empty());
        let x = Array2::from_shape_fn((5, 8), |(i, j)| (i + j) as f32);
        assert_eq!(enc.forward(&x, &mut Mode::Eval), x);
        let (out, weights) = enc.forward_with_weights(&x, &mut Mode::Eval);
        assert_eq!(out, x);
        assert!(weights.is_empty());
    }

    #[test]
    fn test_blocks_run_in_sequence() {
        let enc = encoder(3);
        let x = Array2::from_shape_fn((5, 8), |(i, j)| (i * j) as f32 * 0.1);
        let mut expected = x.clone();
        for block in enc.blocks() {
            expected = block.forward(&expected, &mut Mode::Eval);
        }
        let (out, weights) = enc.forward_with_weights(&x, &mut Mode::Eval);
        assert_eq!(enc.forward(&x, &mut Mode::Eval), expected);
        assert_eq!(out, expected);
        assert_eq!(weights.len(), 3);
    }

    #[test]
    fn test_parameter_keys_are_indexed() {
        let enc = encoder(2);
        let params = enc.parameters("encoder");
        assert!(params.iter().any(|(k, _)| k == "encoder.blocks.0.attn.qkv.weight"));
        assert!(params.iter().any(|(k, _)| k == "encoder.blocks.1.ff.fc2.bias"));
    }
}
