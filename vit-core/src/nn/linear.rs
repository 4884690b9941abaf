use ndarray::{Array1, Array2, ArrayBase, ArrayViewD, ArrayViewMutD, Data, Ix1, Ix2};
use rand::Rng;
use rand::distributions::{Distribution, Uniform};

use super::{Parameters, param_key};

/// Affine projection `y = x W + b`.
///
/// The weight is stored as `(in_features, out_features)` so a sequence of
/// row vectors multiplies it directly.
#[derive(Debug, Clone)]
pub struct Linear {
    weight: Array2<f32>,
    bias: Option<Array1<f32>>,
}

impl Linear {
    /// Create a layer initialized uniformly in `±1/sqrt(in_features)`.
    pub fn new<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        bias: bool,
        rng: &mut R,
    ) -> Self {
        let bound = 1.0 / (in_features as f32).sqrt();
        let dist = Uniform::new_inclusive(-bound, bound);
        let weight =
            Array2::from_shape_simple_fn((in_features, out_features), || dist.sample(&mut *rng));
        let bias = bias.then(|| Array1::from_shape_simple_fn(out_features, || dist.sample(&mut *rng)));
        Self { weight, bias }
    }

    pub fn in_features(&self) -> usize {
        self.weight.nrows()
    }

    pub fn out_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn weight(&self) -> &Array2<f32> {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Array1<f32>> {
        self.bias.as_ref()
    }

    /// Project every row of `x`.
    pub fn forward<S>(&self, x: &ArrayBase<S, Ix2>) -> Array2<f32>
    where
        S: Data<Elem = f32>,
    {
        let mut y = x.dot(&self.weight);
        if let Some(bias) = &self.bias {
            y += bias;
        }
        y
    }

    /// Project a single vector.
    pub fn forward_vec<S>(&self, x: &ArrayBase<S, Ix1>) -> Array1<f32>
    where
        S: Data<Elem = f32>,
    {
        let mut y = x.dot(&self.weight);
        if let Some(bias) = &self.bias {
            y += bias;
        }
        y
    }
}

impl Parameters for Linear {
    fn parameters(&self, prefix: &str) -> Vec<(String, ArrayViewD<'_, f32>)> {
        let mut out = vec![(param_key(prefix, "weight"), self.weight.view().into_dyn())];
        if let Some(bias) = &self.bias {
            out.push((param_key(prefix, "bias"), bias.view().into_dyn()));
        }
        out
    }

    fn parameters_mut(&mut self, prefix: &str) -> Vec<(String, ArrayViewMutD<'_, f32>)> {
        let mut out = vec![(param_key(prefix, "weight"), self.weight.view_mut().into_dyn())];
        if let Some(bias) = &mut self.bias {
            out.push((param_key(prefix, "bias"), bias.view_mut().into_dyn()));
        }
        out
    }
}
