//! Classification token and learned positional embedding.

use ndarray::{Array1, Array2, ArrayBase, ArrayViewD, ArrayViewMutD, Axis, Data, Ix2, concatenate};
use rand::Rng;
use rand::distributions::{Distribution, Uniform};

use crate::config::ViTConfig;
use crate::error::{Error, Result};
use crate::nn::{Mode, Parameters, param_key};

/// Prepends the classification token and adds one learned vector per
/// sequence position. Row 0 of the table belongs to the classification
/// token, rows `1..=N` to the patches.
#[derive(Debug, Clone)]
pub struct PositionalEncoder {
    cls_token: Array1<f32>,
    pos_embedding: Array2<f32>,
    emb_dropout: f32,
}

impl PositionalEncoder {
    pub fn new<R: Rng + ?Sized>(config: &ViTConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        let dist = Uniform::new_inclusive(-1.0f32, 1.0);
        let cls_token = Array1::from_shape_simple_fn(config.dim, || dist.sample(&mut *rng));
        let pos_embedding = Array2::from_shape_simple_fn((config.seq_length(), config.dim), || {
            dist.sample(&mut *rng)
        });
        Ok(Self {
            cls_token,
            pos_embedding,
            emb_dropout: config.emb_dropout,
        })
    }

    pub fn cls_token(&self) -> &Array1<f32> {
        &self.cls_token
    }

    pub fn pos_embedding(&self) -> &Array2<f32> {
        &self.pos_embedding
    }

    /// Turn `N x dim` patch embeddings into the `(N + 1) x dim` encoder input.
    pub fn forward<S>(&self, patches: &ArrayBase<S, Ix2>, mode: &mut Mode<'_>) -> Result<Array2<f32>>
    where
        S: Data<Elem = f32>,
    {
        let expected = (self.pos_embedding.nrows() - 1, self.cls_token.len());
        if patches.dim() != expected {
            return Err(Error::Shape(format!(
                "expected {}x{} patch embeddings, got {}x{}",
                expected.0,
                expected.1,
                patches.nrows(),
                patches.ncols()
            )));
        }

        let cls = self.cls_token.view().insert_axis(Axis(0));
        let mut tokens = concatenate(Axis(0), &[cls, patches.view()])?;
        tokens += &self.pos_embedding;
        mode.dropout(&mut tokens, self.emb_dropout);
        Ok(tokens)
    }
}

impl Parameters for PositionalEncoder {
    fn parameters(&self, prefix: &str) -> Vec<(String, ArrayViewD<'_, f32>)> {
        vec![
            (param_key(prefix, "cls_token"), self.cls_token.view().into_dyn()),
            (param_key(prefix, "pos_embedding"), self.pos_embedding.view().into_dyn()),
        ]
    }

    fn parameters_mut(&mut self, prefix: &str) -> Vec<(String, ArrayViewMutD<'_, f32>)> {
        vec![
            (param_key(prefix, "cls_token"), self.cls_token.view_mut().into_dyn()),
            (param_key(prefix, "pos_embedding"), self.pos_embedding.view_mut().into_dyn()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn encoder(emb_dropout: f32) -> PositionalEncoder {
        // 2x2 grid of patches, dim 8
        let config = ViTConfig::new(4, 2, 3, 8, 1, 2, 16, 0.0, emb_dropout);
        PositionalEncoder::new(&config, &mut StdRng::seed_from_u64(5)).unwrap()
    }

    #[test]
    fn test_prepends_cls_and_adds_positions() {
        let enc = encoder(0.0);
        let patches = Array2::from_shape_fn((4, 8), |(i, j)| (i * 8 + j) as f32);
        let out = enc.forward(&patches, &mut Mode::Eval).unwrap();
        assert_eq!(out.dim(), (5, 8));

        let expected_cls = &enc.cls_token + &enc.pos_embedding.row(0);
        assert_eq!(out.row(0), expected_cls);
        for i in 0..4 {
            let expected = &patches.row(i) + &enc.pos_embedding.row(i + 1);
            assert_eq!(out.row(i + 1), expected);
        }
    }

    #[test]
    fn test_patch_order_matters() {
        let enc = encoder(0.0);
        let patches = Array2::from_shape_fn((4, 8), |(i, j)| (i * 8 + j) as f32);
        let mut swapped = patches.clone();
        swapped.row_mut(0).assign(&patches.row(1));
        swapped.row_mut(1).assign(&patches.row(0));

        let a = enc.forward(&patches, &mut Mode::Eval).unwrap();
        let b = enc.forward(&swapped, &mut Mode::Eval).unwrap();
        // swapping patches is not the same as swapping encoded rows
        assert_ne!(a.row(1), b.row(2));
        assert_ne!(a, b);
    }

    #[test]
    fn test_rejects_wrong_length() {
        let enc = encoder(0.0);
        let patches = Array2::<f32>::zeros((3, 8));
        assert!(matches!(enc.forward(&patches, &mut Mode::Eval), Err(Error::Shape(_))));
    }

    #[test]
    fn test_emb_dropout_only_in_training() {
        let enc = encoder(0.5);
        let patches = Array2::<f32>::ones((4, 8));
        let a = enc.forward(&patches, &mut Mode::Eval).unwrap();
        let b = enc.forward(&patches, &mut Mode::Eval).unwrap();
        assert_eq!(a, b);

        let mut rng = StdRng::seed_from_u64(9);
        let c = enc.forward(&patches, &mut Mode::Train(&mut rng)).unwrap();
        assert_ne!(a, c);
    }
}
