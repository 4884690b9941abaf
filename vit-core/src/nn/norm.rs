use ndarray::{Array1, Array2, ArrayBase, ArrayViewD, ArrayViewMut1, ArrayViewMutD, Data, Ix1, Ix2, Zip};

use super::{Parameters, param_key};

/// Layer normalization over the feature axis with learned gain and bias.
#[derive(Debug, Clone)]
pub struct LayerNorm {
    gamma: Array1<f32>,
    beta: Array1<f32>,
    eps: f32,
}

impl LayerNorm {
    /// Gain starts at one, bias at zero.
    pub fn new(dim: usize, eps: f32) -> Self {
        Self {
            gamma: Array1::ones(dim),
            beta: Array1::zeros(dim),
            eps,
        }
    }

    pub fn dim(&self) -> usize {
        self.gamma.len()
    }

    /// Normalize every row of `x`.
    pub fn forward<S>(&self, x: &ArrayBase<S, Ix2>) -> Array2<f32>
    where
        S: Data<Elem = f32>,
    {
        let mut out = x.to_owned();
        for row in out.rows_mut() {
            self.normalize(row);
        }
        out
    }

    /// Normalize a single vector.
    pub fn forward_vec<S>(&self, x: &ArrayBase<S, Ix1>) -> Array1<f32>
    where
        S: Data<Elem = f32>,
    {
        let mut out = x.to_owned();
        self.normalize(out.view_mut());
        out
    }

    fn normalize(&self, mut row: ArrayViewMut1<'_, f32>) {
        let n = row.len() as f32;
        let mean = row.sum() / n;
        let var = row.fold(0.0, |acc, &v| acc + (v - mean).powi(2)) / n;
        let inv_std = 1.0 / (var + self.eps).sqrt();
        Zip::from(&mut row)
            .and(&self.gamma)
            .and(&self.beta)
            .for_each(|v, &g, &b| *v = (*v - mean) * inv_std * g + b);
    }
}

impl Parameters for LayerNorm {
    fn parameters(&self, prefix: &str) -> Vec<(String, ArrayViewD<'_, f32>)> {
        vec![
            (param_key(prefix, "gamma"), self.gamma.view().into_dyn()),
            (param_key(prefix, "beta"), self.beta.view().into_dyn()),
        ]
    }

    fn parameters_mut(&mut self, prefix: &str) -> Vec<(String, ArrayViewMutD<'_, f32>)> {
        vec![
            (param_key(prefix, "gamma"), self.gamma.view_mut().into_dyn()),
            (param_key(prefix, "beta"), self.beta.view_mut().into_dyn()),
        ]
    }
}
