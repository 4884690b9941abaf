//! The full Vision Transformer classifier.

use ndarray::{Array1, Array2, Array3, ArrayBase, ArrayViewD, ArrayViewMutD, Data, Ix3, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::config::ViTConfig;
use crate::encoder::Encoder;
use crate::error::{Error, Result};
use crate::head::ClassificationHead;
use crate::nn::{Mode, Parameters, param_key};
use crate::patch::PatchEmbedding;
use crate::position::PositionalEncoder;

/// Logits together with the attention weights of every encoder block.
#[derive(Debug, Clone)]
pub struct ForwardTrace {
    pub logits: Array1<f32>,
    /// One `heads x seq x seq` array per block, in block order.
    pub attention: Vec<Array3<f32>>,
}

/// Vision Transformer image classifier.
///
/// Owns every learned tensor. [`forward`](Self::forward) borrows the model
/// immutably, so any number of passes may share it; updating parameters
/// requires exclusive access.
#[derive(Debug, Clone)]
pub struct ViTModel {
    config: ViTConfig,
    patch_embedding: PatchEmbedding,
    positional: PositionalEncoder,
    encoder: Encoder,
    head: ClassificationHead,
}

impl ViTModel {
    /// Build a model with freshly initialized parameters.
    pub fn new(config: ViTConfig) -> Result<Self> {
        Self::with_rng(config, &mut StdRng::from_entropy())
    }

    /// Build a model whose initial parameters depend only on `seed`.
    pub fn with_seed(config: ViTConfig, seed: u64) -> Result<Self> {
        Self::with_rng(config, &mut StdRng::seed_from_u64(seed))
    }

    /// Build a model drawing initial parameters from `rng`.
    ///
    /// Fails with [`Error::Configuration`] before allocating anything if the
    /// config is invalid.
    pub fn with_rng<R: Rng + ?Sized>(config: ViTConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;

        let model = Self {
            patch_embedding: PatchEmbedding::new(&config, rng)?,
            positional: PositionalEncoder::new(&config, rng)?,
            encoder: Encoder::new(&config, rng)?,
            head: ClassificationHead::new(&config, rng)?,
            config,
        };
        debug!(
            image_size = model.config.image_size,
            patch_size = model.config.patch_size,
            dim = model.config.dim,
            depth = model.config.depth,
            heads = model.config.heads,
            num_classes = model.config.num_classes,
            params = model.num_parameters(),
            "built ViT model"
        );
        Ok(model)
    }

    pub fn config(&self) -> &ViTConfig {
        &self.config
    }

    pub fn patch_embedding(&self) -> &PatchEmbedding {
        &self.patch_embedding
    }

    pub fn positional(&self) -> &PositionalEncoder {
        &self.positional
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn head(&self) -> &ClassificationHead {
        &self.head
    }

    /// Classify one `(channels, image_size, image_size)` image.
    ///
    /// Returns `num_classes` unnormalized scores. In [`Mode::Eval`] the
    /// result is a deterministic function of the parameters and the image.
    pub fn forward<S>(&self, image: &ArrayBase<S, Ix3>, mode: &mut Mode<'_>) -> Result<Array1<f32>>
    where
        S: Data<Elem = f32>,
    {
        let tokens = self.embed(image, mode)?;
        let encoded = self.encoder.forward(&tokens, mode);
        self.head.forward(&encoded)
    }

    /// [`forward`](Self::forward) that also records every block's attention weights.
    pub fn forward_traced<S>(&self, image: &ArrayBase<S, Ix3>, mode: &mut Mode<'_>) -> Result<ForwardTrace>
    where
        S: Data<Elem = f32>,
    {
        let tokens = self.embed(image, mode)?;
        let (encoded, attention) = self.encoder.forward_with_weights(&tokens, mode);
        let logits = self.head.forward(&encoded)?;
        Ok(ForwardTrace { logits, attention })
    }

    /// Inference-mode forward pass.
    pub fn infer<S>(&self, image: &ArrayBase<S, Ix3>) -> Result<Array1<f32>>
    where
        S: Data<Elem = f32>,
    {
        self.forward(image, &mut Mode::Eval)
    }

    /// Inference over independent images, spread across the rayon pool.
    ///
    /// Results keep the input order. Any malformed image fails the whole call.
    pub fn infer_batch(&self, images: &[Array3<f32>]) -> Result<Vec<Array1<f32>>> {
        images.par_iter().map(|image| self.infer(image)).collect()
    }

    fn embed<S>(&self, image: &ArrayBase<S, Ix3>, mode: &mut Mode<'_>) -> Result<Array2<f32>>
    where
        S: Data<Elem = f32>,
    {
        let patches = self.patch_embedding.forward(image.view())?;
        self.positional.forward(&patches, mode)
    }

    /// Read-only view of the tensor stored under `key`.
    pub fn parameter(&self, key: &str) -> Option<ArrayViewD<'_, f32>> {
        self.parameters("")
            .into_iter()
            .find_map(|(name, view)| (name == key).then_some(view))
    }

    /// Mutable view of the tensor stored under `key`.
    pub fn parameter_mut(&mut self, key: &str) -> Option<ArrayViewMutD<'_, f32>> {
        self.parameters_mut("")
            .into_iter()
            .find_map(|(name, view)| (name == key).then_some(view))
    }

    /// Overwrite the tensor stored under `key` with `value`.
    pub fn set_parameter<S>(&mut self, key: &str, value: &ArrayBase<S, IxDyn>) -> Result<()>
    where
        S: Data<Elem = f32>,
    {
        let mut target = self
            .parameter_mut(key)
            .ok_or_else(|| Error::UnknownParameter(key.to_string()))?;
        if target.shape() != value.shape() {
            return Err(Error::Shape(format!(
                "parameter '{key}' has shape {:?}, got {:?}",
                target.shape(),
                value.shape()
            )));
        }
        target.assign(value);
        Ok(())
    }

    /// Keys of every learned tensor, in a stable order.
    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters("").into_iter().map(|(name, _)| name).collect()
    }
}

impl Parameters for ViTModel {
    fn parameters(&self, prefix: &str) -> Vec<(String, ArrayViewD<'_, f32>)> {
        let mut out = self
            .patch_embedding
            .parameters(&param_key(prefix, "patch_embedding"));
        out.extend(self.positional.parameters(&param_key(prefix, "positional")));
        out.extend(self.encoder.parameters(&param_key(prefix, "encoder")));
        out.extend(self.head.parameters(&param_key(prefix, "head")));
        out
    }

    fn parameters_mut(&mut self, prefix: &str) -> Vec<(String, ArrayViewMutD<'_, f32>)> {
        let mut out = self
            .patch_embedding
            .parameters_mut(&param_key(prefix, "patch_embedding"));
        out.extend(self.positional.parameters_mut(&param_key(prefix, "positional")));
        out.extend(self.encoder.parameters_mut(&param_key(prefix, "encoder")));
        out.extend(self.head.parameters_mut(&param_key(prefix, "head")));
        out
    }
}
