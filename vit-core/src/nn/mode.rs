use ndarray::{ArrayBase, DataMut, Dimension};
use rand::{Rng, RngCore};

/// Whether a forward pass runs for training or inference.
///
/// Dropout is the only stochastic stage. In [`Mode::Eval`] it is the
/// identity; in [`Mode::Train`] it zeroes elements with the configured rate
/// and rescales survivors by `1 / (1 - rate)`, drawing from the supplied RNG.
pub enum Mode<'a> {
    Eval,
    Train(&'a mut dyn RngCore),
}

impl<'a> Mode<'a> {
    pub fn train(rng: &'a mut dyn RngCore) -> Self {
        Mode::Train(rng)
    }

    pub fn is_training(&self) -> bool {
        matches!(self, Mode::Train(_))
    }

    /// Apply inverted dropout to `x` in place.
    pub fn dropout<S, D>(&mut self, x: &mut ArrayBase<S, D>, rate: f32)
    where
        S: DataMut<Elem = f32>,
        D: Dimension,
    {
        let Mode::Train(rng) = self else {
            return;
        };
        if rate <= 0.0 {
            return;
        }
        let scale = 1.0 / (1.0 - rate);
        let p = f64::from(rate);
        x.mapv_inplace(|v| if rng.gen_bool(p) { 0.0 } else { v * scale });
    }
}

impl std::fmt::Debug for Mode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Eval => write!(f, "Eval"),
            Mode::Train(_) => write!(f, "Train"),
        }
    }
}
