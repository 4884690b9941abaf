//! Position-wise feed-forward sublayer.

use ndarray::{Array2, ArrayBase, ArrayViewD, ArrayViewMutD, Data, Ix2};
use rand::Rng;

use crate::config::{Activation, ViTConfig};
use crate::error::Result;
use crate::nn::{Linear, Mode, Parameters, param_key};

/// `dim -> mlp_dim -> dim`, applied to each position independently.
#[derive(Debug, Clone)]
pub struct FeedForward {
    fc1: Linear,
    fc2: Linear,
    activation: Activation,
    dropout: f32,
}

impl FeedForward {
    pub fn new<R: Rng + ?Sized>(config: &ViTConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            fc1: Linear::new(config.dim, config.mlp_dim, true, rng),
            fc2: Linear::new(config.mlp_dim, config.dim, true, rng),
            activation: config.activation,
            dropout: config.dropout,
        })
    }

    pub fn forward<S>(&self, x: &ArrayBase<S, Ix2>, mode: &mut Mode<'_>) -> Array2<f32>
    where
        S: Data<Elem = f32>,
    {
        let mut hidden = self.fc1.forward(x);
        let activation = self.activation;
        hidden.mapv_inplace(|v| activation.apply(v));
        mode.dropout(&mut hidden, self.dropout);

        let mut out = self.fc2.forward(&hidden);
        mode.dropout(&mut out, self.dropout);
        out
    }
}

impl Parameters for FeedForward {
    fn parameters(&self, prefix: &str) -> Vec<(String, ArrayViewD<'_, f32>)> {
        let mut out = self.fc1.parameters(&param_key(prefix, "fc1"));
        out.extend(self.fc2.parameters(&param_key(prefix, "fc2")));
        out
    }

    fn parameters_mut(&mut self, prefix: &str) -> Vec<(String, ArrayViewMutD<'_, f32>)> {
        let mut out = self.fc1.parameters_mut(&param_key(prefix, "fc1"));
        out.extend(self.fc2.parameters_mut(&param_key(prefix, "fc2")));
        out
    }
}
