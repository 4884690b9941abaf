//! Pooling and projection to class logits.

use ndarray::{Array1, ArrayBase, ArrayViewD, ArrayViewMutD, Axis, Data, Ix2};
use rand::Rng;

use crate::config::{Pool, ViTConfig};
use crate::error::{Error, Result};
use crate::nn::{LayerNorm, Linear, Parameters, param_key};

/// Reduces the encoder output to one vector, normalizes it and projects it
/// to `num_classes` unnormalized scores.
#[derive(Debug, Clone)]
pub struct ClassificationHead {
    pool: Pool,
    norm: LayerNorm,
    proj: Linear,
}

impl ClassificationHead {
    pub fn new<R: Rng + ?Sized>(config: &ViTConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pool: config.pool,
            norm: LayerNorm::new(config.dim, config.layer_norm_eps),
            proj: Linear::new(config.dim, config.num_classes, true, rng),
        })
    }

    pub fn num_classes(&self) -> usize {
        self.proj.out_features()
    }

    /// Select position 0 or average all positions, per the pooling mode.
    pub fn pool<S>(&self, x: &ArrayBase<S, Ix2>) -> Result<Array1<f32>>
    where
        S: Data<Elem = f32>,
    {
        if x.nrows() == 0 {
            return Err(Error::Shape("cannot pool an empty sequence".to_string()));
        }
        let pooled = match self.pool {
            Pool::Cls => x.row(0).to_owned(),
            Pool::Mean => x.sum_axis(Axis(0)) / x.nrows() as f32,
        };
        Ok(pooled)
    }

    pub fn forward<S>(&self, x: &ArrayBase<S, Ix2>) -> Result<Array1<f32>>
    where
        S: Data<Elem = f32>,
    {
        let pooled = self.pool(x)?;
        Ok(self.proj.forward_vec(&self.norm.forward_vec(&pooled)))
    }
}

impl Parameters for ClassificationHead {
    fn parameters(&self, prefix: &str) -> Vec<(String, ArrayViewD<'_, f32>)> {
        let mut out = self.norm.parameters(&param_key(prefix, "norm"));
        out.extend(self.proj.parameters(&param_key(prefix, "proj")));
        out
    }

    fn parameters_mut(&mut self, prefix: &str) -> Vec<(String, ArrayViewMutD<'_, f32>)> {
        let mut out = self.norm.parameters_mut(&param_key(prefix, "norm"));
        out.extend(self.proj.parameters_mut(&param_key(prefix, "proj")));
        out
    }
}
