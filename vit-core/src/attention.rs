//! Multi-head scaled dot-product self-attention.

use ndarray::{Array2, Array3, ArrayBase, ArrayViewD, ArrayViewMutD, Data, Ix2, s};
use rand::Rng;

use crate::config::ViTConfig;
use crate::error::Result;
use crate::nn::{Linear, Mode, Parameters, param_key, softmax_rows};

/// Self-attention over a `seq x dim` sequence, split into `heads` disjoint
/// subspaces of width `dim / heads`.
///
/// Query, key and value come from one fused `dim -> 3 * dim` projection,
/// laid out as `[q | k | v]`; head `h` reads columns `h * head_dim..(h + 1) * head_dim`
/// of each part.
#[derive(Debug, Clone)]
pub struct MultiHeadSelfAttention {
    heads: usize,
    head_dim: usize,
    scale: f32,
    dropout: f32,
    qkv: Linear,
    out: Linear,
}

impl MultiHeadSelfAttention {
    pub fn new<R: Rng + ?Sized>(config: &ViTConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        let head_dim = config.head_dim();
        Ok(Self {
            heads: config.heads,
            head_dim,
            scale: (head_dim as f32).sqrt().recip(),
            dropout: config.dropout,
            qkv: Linear::new(config.dim, 3 * config.dim, config.qkv_bias, rng),
            out: Linear::new(config.dim, config.dim, true, rng),
        })
    }

    pub fn heads(&self) -> usize {
        self.heads
    }

    pub fn head_dim(&self) -> usize {
        self.head_dim
    }

    pub fn forward<S>(&self, x: &ArrayBase<S, Ix2>, mode: &mut Mode<'_>) -> Array2<f32>
    where
        S: Data<Elem = f32>,
    {
        self.attend(x, mode, None)
    }

    /// Attend over `x`, also returning the `heads x seq x seq` attention
    /// weights as computed before dropout.
    pub fn forward_with_weights<S>(
        &self,
        x: &ArrayBase<S, Ix2>,
        mode: &mut Mode<'_>,
    ) -> (Array2<f32>, Array3<f32>)
    where
        S: Data<Elem = f32>,
    {
        let seq = x.nrows();
        let mut weights = Array3::<f32>::zeros((self.heads, seq, seq));
        let out = self.attend(x, mode, Some(&mut weights));
        (out, weights)
    }

    /// Shared attention kernel; copies each head's weights into `record`
    /// when given.
    fn attend<S>(
        &self,
        x: &ArrayBase<S, Ix2>,
        mode: &mut Mode<'_>,
        mut record: Option<&mut Array3<f32>>,
    ) -> Array2<f32>
    where
        S: Data<Elem = f32>,
    {
        let seq = x.nrows();
        let dim = self.heads * self.head_dim;
        let qkv = self.qkv.forward(x);

        let mut context = Array2::<f32>::zeros((seq, dim));
        for h in 0..self.heads {
            let (lo, hi) = (h * self.head_dim, (h + 1) * self.head_dim);
            let q = qkv.slice(s![.., lo..hi]);
            let k = qkv.slice(s![.., dim + lo..dim + hi]);
            let v = qkv.slice(s![.., 2 * dim + lo..2 * dim + hi]);

            let mut scores = q.dot(&k.t());
            scores *= self.scale;
            softmax_rows(&mut scores);
            if let Some(weights) = record.as_deref_mut() {
                weights.slice_mut(s![h, .., ..]).assign(&scores);
            }

            mode.dropout(&mut scores, self.dropout);
            context.slice_mut(s![.., lo..hi]).assign(&scores.dot(&v));
        }

        let mut out = self.out.forward(&context);
        mode.dropout(&mut out, self.dropout);
        out
    }
}

impl Parameters for MultiHeadSelfAttention {
    fn parameters(&self, prefix: &str) -> Vec<(String, ArrayViewD<'_, f32>)> {
        let mut out = self.qkv.parameters(&param_key(prefix, "qkv"));
        out.extend(self.out.parameters(&param_key(prefix, "out")));
        out
    }

    fn parameters_mut(&mut self, prefix: &str) -> Vec<(String, ArrayViewMutD<'_, f32>)> {
        let mut out = self.qkv.parameters_mut(&param_key(prefix, "qkv"));
        out.extend(self.out.parameters_mut(&param_key(prefix, "out")));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn attention(dim: usize, heads: usize) -> MultiHeadSelfAttention {
        let config = ViTConfig::new(4, 2, 3, dim, 1, heads, 16, 0.0, 0.0);
        MultiHeadSelfAttention::new(&config, &mut StdRng::seed_from_u64(11)).unwrap()
    }

    fn sequence(seq: usize, dim: usize) -> Array2<f32> {
        Array2::from_shape_fn((seq, dim), |(i, j)| ((i * 7 + j * 3) % 11) as f32 / 5.0 - 1.0)
    }

    #[test]
    fn test_weights_sum_to_one() {
        let attn = attention(16, 4);
        let (out, weights) = attn.forward_with_weights(&sequence(5, 16), &mut Mode::Eval);
        assert_eq!(out.dim(), (5, 16));
        assert_eq!(weights.dim(), (4, 5, 5));
        for head in weights.outer_iter() {
            for row in head.rows() {
                assert!((row.sum() - 1.0).abs() < 1e-5);
                assert!(row.iter().all(|&w| w >= 0.0));
            }
        }
    }

    #[test]
    fn test_permutation_equivariant() {
        let attn = attention(8, 2);
        let x = sequence(4, 8);
        let perm = [2usize, 0, 3, 1];
        let mut permuted = Array2::<f32>::zeros(x.raw_dim());
        for (dst, &src) in perm.iter().enumerate() {
            permuted.row_mut(dst).assign(&x.row(src));
        }

        let a = attn.forward(&x, &mut Mode::Eval);
        let b = attn.forward(&permuted, &mut Mode::Eval);
        for (dst, &src) in perm.iter().enumerate() {
            for (u, v) in b.row(dst).iter().zip(a.row(src).iter()) {
                assert!((u - v).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_forward_matches_weighted_forward() {
        let attn = attention(16, 4);
        let x = sequence(6, 16);
        let plain = attn.forward(&x, &mut Mode::Eval);
        let (traced, _) = attn.forward_with_weights(&x, &mut Mode::Eval);
        assert_eq!(plain, traced);
    }

    #[test]
    fn test_single_position_attends_to_itself() {
        let attn = attention(8, 4);
        let (_, weights) = attn.forward_with_weights(&sequence(1, 8), &mut Mode::Eval);
        assert!(weights.iter().all(|&w| (w - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_parameter_keys() {
        let attn = attention(8, 2);
        let keys: Vec<_> = attn.parameters("attn").into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["attn.qkv.weight", "attn.out.weight", "attn.out.bias"]);
        assert_eq!(attn.num_parameters(), 8 * 24 + 8 * 8 + 8);
    }
}
