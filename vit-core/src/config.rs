//! ViT configuration, validation, and architecture summary.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Non-linearity used inside the feed-forward sublayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    #[default]
    Gelu,
    Silu,
}

/// How the encoder output sequence is reduced to a single vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Pool {
    /// Take the classification token at position 0.
    #[default]
    Cls,
    /// Average over every position, classification token included.
    Mean,
}

/// Vision Transformer configuration.
///
/// The nine fields without defaults fully describe the architecture; the
/// rest refine it. Loadable from YAML, including files written with a
/// Python object tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViTConfig {
    // Inputs
    pub image_size: usize,
    pub patch_size: usize,
    #[serde(default = "default_channels")]
    pub channels: usize,

    // Output
    pub num_classes: usize,

    // Transformer architecture
    pub dim: usize,
    pub depth: usize,
    pub heads: usize,
    pub mlp_dim: usize,

    #[serde(default)]
    pub dropout: f32,
    #[serde(default)]
    pub emb_dropout: f32,
    #[serde(default)]
    pub pool: Pool,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f32,
    #[serde(default)]
    pub qkv_bias: bool,
}

fn default_channels() -> usize {
    3
}
fn default_layer_norm_eps() -> f32 {
    1e-5
}

impl ViTConfig {
    /// Create a config from the core hyperparameters, leaving the rest at
    /// their defaults.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        image_size: usize,
        patch_size: usize,
        num_classes: usize,
        dim: usize,
        depth: usize,
        heads: usize,
        mlp_dim: usize,
        dropout: f32,
        emb_dropout: f32,
    ) -> Self {
        Self {
            image_size,
            patch_size,
            channels: default_channels(),
            num_classes,
            dim,
            depth,
            heads,
            mlp_dim,
            dropout,
            emb_dropout,
            pool: Pool::default(),
            activation: Activation::default(),
            layer_norm_eps: default_layer_norm_eps(),
            qkv_bias: false,
        }
    }

    /// Set the input channel count.
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    /// Set the pooling strategy.
    pub fn with_pool(mut self, pool: Pool) -> Self {
        self.pool = pool;
        self
    }

    /// Set the feed-forward activation.
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Load a ViTConfig from a YAML file.
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_yaml_str(&content)
    }

    /// Parse a ViTConfig from a YAML string.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let cleaned = strip_python_tags(content);
        let config: ViTConfig = serde_yaml::from_str(&cleaned)?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("image_size", self.image_size),
            ("patch_size", self.patch_size),
            ("channels", self.channels),
            ("num_classes", self.num_classes),
            ("dim", self.dim),
            ("heads", self.heads),
            ("mlp_dim", self.mlp_dim),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::Configuration(format!("{name} must be > 0")));
            }
        }

        if self.image_size % self.patch_size != 0 {
            return Err(Error::Configuration(format!(
                "image_size {} must be divisible by patch_size {}",
                self.image_size, self.patch_size
            )));
        }

        if self.dim % self.heads != 0 {
            return Err(Error::Configuration(format!(
                "dim ({}) must be divisible by heads ({})",
                self.dim, self.heads
            )));
        }

        for (name, rate) in [("dropout", self.dropout), ("emb_dropout", self.emb_dropout)] {
            if !(0.0..1.0).contains(&rate) {
                return Err(Error::Configuration(format!(
                    "{name} must be in [0, 1), got {rate}"
                )));
            }
        }

        if self.layer_norm_eps.is_nan() || self.layer_norm_eps <= 0.0 {
            return Err(Error::Configuration(format!(
                "layer_norm_eps must be > 0, got {}",
                self.layer_norm_eps
            )));
        }

        Ok(())
    }

    /// Patches per side of the image grid; 0 when `patch_size` is 0.
    pub fn grid_size(&self) -> usize {
        self.image_size.checked_div(self.patch_size).unwrap_or(0)
    }

    /// Compute the number of tokens after patch embedding.
    pub fn num_patches(&self) -> usize {
        self.grid_size().pow(2)
    }

    /// Sequence length seen by the encoder: patches plus the classification token.
    pub fn seq_length(&self) -> usize {
        self.num_patches() + 1
    }

    /// Width of one attention head; 0 when `heads` is 0.
    pub fn head_dim(&self) -> usize {
        self.dim.checked_div(self.heads).unwrap_or(0)
    }

    /// Length of one flattened patch.
    pub fn patch_dim(&self) -> usize {
        self.channels * self.patch_size * self.patch_size
    }

    /// Compute a summary of the model's architecture and parameters.
    ///
    /// Fails with [`Error::Configuration`] if the config does not validate.
    pub fn compute_summary(&self) -> Result<ModelSummary> {
        self.validate()?;

        let dim = self.dim;
        let num_patches = self.num_patches();
        let seq_length = self.seq_length();

        let patch_embed_params = self.patch_dim() * dim + dim;
        let token_params = dim;
        let pos_enc_params = seq_length * dim;

        // LayerNorm carries gamma and beta; two norms per layer (attn + mlp)
        let norm_params = 2 * (2 * dim);
        let qkv_params = 3 * dim * dim + if self.qkv_bias { 3 * dim } else { 0 };
        let attn_out_params = dim * dim + dim;
        let ffn_params = dim * self.mlp_dim + self.mlp_dim + self.mlp_dim * dim + dim;

        let params_per_layer = norm_params + qkv_params + attn_out_params + ffn_params;
        let transformer_params = params_per_layer * self.depth;

        let head_params = 2 * dim + dim * self.num_classes + self.num_classes;

        let total_params = patch_embed_params
            + token_params
            + pos_enc_params
            + transformer_params
            + head_params;

        Ok(ModelSummary {
            total_params,
            patch_embed_params,
            token_params,
            pos_enc_params,
            transformer_params,
            params_per_layer,
            head_params,
            depth: self.depth,
            dim,
            mlp_dim: self.mlp_dim,
            heads: self.heads,
            head_dim: self.head_dim(),
            num_classes: self.num_classes,
            num_patches,
            seq_length,
            activation: self.activation,
            pool: self.pool,
        })
    }
}

/// Summary of model architecture and parameter counts.
#[derive(Debug, Clone)]
pub struct ModelSummary {
    pub total_params: usize,
    pub patch_embed_params: usize,
    pub token_params: usize,
    pub pos_enc_params: usize,
    pub transformer_params: usize,
    pub params_per_layer: usize,
    pub head_params: usize,
    pub depth: usize,
    pub dim: usize,
    pub mlp_dim: usize,
    pub heads: usize,
    pub head_dim: usize,
    pub num_classes: usize,
    pub num_patches: usize,
    pub seq_length: usize,
    pub activation: Activation,
    pub pool: Pool,
}

impl ModelSummary {
    /// Memory held by the parameters in bytes (f32 storage).
    pub fn param_memory_bytes(&self) -> usize {
        self.total_params * std::mem::size_of::<f32>()
    }

    /// Format the summary as a human-readable string.
    pub fn display(&self) -> String {
        let param_mb = self.param_memory_bytes() as f64 / 1_000_000.0;
        let total_m = self.total_params as f64 / 1_000_000.0;

        format!(
            r#"Model Summary
=============
Architecture:
  Depth:              {}
  Dim:                {}
  MLP Dim:            {}
  Attention Heads:    {}
  Head Dimension:     {}
  Activation:         {:?}
  Pooling:            {:?}
  Classes:            {}

Sequence:
  Num Patches:        {}
  Sequence Length:    {}

Parameters:
  Total:              {:.2}M
  Patch Embedding:    {}
  Class Token:        {}
  Position Encoding:  {}
  Transformer:        {}
  Per Layer:          {}
  Head:               {}

Memory:
  Parameters:         {:.2} MB (f32)"#,
            self.depth,
            self.dim,
            self.mlp_dim,
            self.heads,
            self.head_dim,
            self.activation,
            self.pool,
            self.num_classes,
            self.num_patches,
            self.seq_length,
            total_m,
            self.patch_embed_params,
            self.token_params,
            self.pos_enc_params,
            self.transformer_params,
            self.params_per_layer,
            self.head_params,
            param_mb,
        )
    }
}

/// Strip Python object tags from YAML content.
///
/// A line such as `!!python/object:vit.ViTConfig` loses the tag and keeps
/// whatever followed it.
fn strip_python_tags(content: &str) -> String {
    const TAG: &str = "!!python/object:";

    let mut result = String::with_capacity(content.len());
    for line in content.lines() {
        match line.find(TAG) {
            Some(start) => {
                let rest = &line[start + TAG.len()..];
                let end = rest
                    .find(char::is_whitespace)
                    .map_or(line.len(), |i| start + TAG.len() + i);
                result.push_str(&line[..start]);
                result.push_str(&line[end..]);
            }
            None => result.push_str(line),
        }
        result.push('\n');
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
image_size: 400
patch_size: 20
num_classes: 6
dim: 1024
depth: 6
heads: 16
mlp_dim: 2048
dropout: 0.1
emb_dropout: 0.1
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = ViTConfig::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(config.depth, 6);
        assert_eq!(config.dim, 1024);
        assert_eq!(config.channels, 3);
        assert_eq!(config.pool, Pool::Cls);
        assert_eq!(config.activation, Activation::Gelu);
        assert_eq!(config.num_patches(), 400); // (400/20)^2
        assert_eq!(config.seq_length(), 401);
        config.validate().unwrap();
    }

    #[test]
    fn test_matches_constructor() {
        let parsed = ViTConfig::from_yaml_str(MINIMAL).unwrap();
        let built = ViTConfig::new(400, 20, 6, 1024, 6, 16, 2048, 0.1, 0.1);
        assert_eq!(parsed, built);
    }

    #[test]
    fn test_parse_with_python_tag() {
        let yaml = format!("!!python/object:transformer.ViT\n{MINIMAL}");
        let config = ViTConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config.heads, 16);
    }

    #[test]
    fn test_parse_optional_fields() {
        let yaml = r#"
image_size: 32
patch_size: 8
num_classes: 10
channels: 1
dim: 64
depth: 0
heads: 4
mlp_dim: 128
pool: mean
activation: silu
qkv_bias: true
"#;
        let config = ViTConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.channels, 1);
        assert_eq!(config.pool, Pool::Mean);
        assert_eq!(config.activation, Activation::Silu);
        assert!(config.qkv_bias);
        assert_eq!(config.dropout, 0.0);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_indivisible_patch() {
        let config = ViTConfig::new(400, 21, 6, 1024, 6, 16, 2048, 0.1, 0.1);
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_validate_indivisible_heads() {
        let config = ViTConfig::new(400, 20, 6, 1023, 6, 16, 2048, 0.1, 0.1);
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_validate_zero_fields() {
        let base = ViTConfig::new(32, 8, 10, 64, 2, 4, 128, 0.0, 0.0);
        assert!(base.clone().with_channels(0).validate().is_err());

        let mut config = base.clone();
        config.num_classes = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.heads = 0;
        assert!(config.validate().is_err());

        let mut config = base;
        config.depth = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_dropout_range() {
        let config = ViTConfig::new(32, 8, 10, 64, 2, 4, 128, 1.0, 0.0);
        assert!(config.validate().is_err());
        let config = ViTConfig::new(32, 8, 10, 64, 2, 4, 128, 0.0, -0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_compute_summary() {
        let config = ViTConfig::from_yaml_str(MINIMAL).unwrap();
        let summary = config.compute_summary().unwrap();
        assert_eq!(summary.depth, 6);
        assert_eq!(summary.head_dim, 64);
        assert_eq!(summary.num_patches, 400);
        assert_eq!(summary.seq_length, 401);
        assert_eq!(summary.patch_embed_params, 3 * 20 * 20 * 1024 + 1024);
        assert_eq!(summary.head_params, 2 * 1024 + 1024 * 6 + 6);
        assert_eq!(
            summary.total_params,
            summary.patch_embed_params
                + summary.token_params
                + summary.pos_enc_params
                + summary.transformer_params
                + summary.head_params
        );
        assert!(summary.display().contains("Sequence Length:    401"));
    }

    #[test]
    fn test_summary_rejects_invalid_config() {
        let zero_patch = ViTConfig::new(4, 0, 3, 8, 1, 2, 16, 0.0, 0.0);
        assert_eq!(zero_patch.grid_size(), 0);
        assert!(matches!(zero_patch.compute_summary(), Err(Error::Configuration(_))));

        let zero_heads = ViTConfig::new(4, 2, 3, 8, 1, 0, 16, 0.0, 0.0);
        assert_eq!(zero_heads.head_dim(), 0);
        assert!(matches!(zero_heads.compute_summary(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_strip_python_tags() {
        let input = "!!python/object:transformer.ViT\nkey: value";
        let output = strip_python_tags(input);
        assert!(!output.contains("!!python/object"));
        assert!(output.contains("key: value"));
    }
}
