//! Summarize command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use vit_core::{ModelSummary, ViTConfig};

/// Transient f32 memory one eval-mode forward pass needs per image.
struct ActivationFootprint {
    /// One `seq x dim` token matrix.
    sequence_bytes: usize,
    /// Fused query/key/value for one block.
    qkv_bytes: usize,
    /// One head's `seq x seq` score matrix.
    scores_bytes: usize,
    /// Feed-forward hidden state for one block.
    hidden_bytes: usize,
}

impl ActivationFootprint {
    fn new(summary: &ModelSummary) -> Self {
        let f32_size = std::mem::size_of::<f32>();
        let seq = summary.seq_length;
        Self {
            sequence_bytes: seq * summary.dim * f32_size,
            qkv_bytes: 3 * seq * summary.dim * f32_size,
            scores_bytes: seq * seq * f32_size,
            hidden_bytes: seq * summary.mlp_dim * f32_size,
        }
    }

    /// Largest single allocation during a block.
    fn peak_bytes(&self) -> usize {
        self.sequence_bytes.max(self.qkv_bytes).max(self.scores_bytes).max(self.hidden_bytes)
    }
}

fn mb(bytes: usize) -> f64 {
    bytes as f64 / 1_000_000.0
}

/// Run the summarize command.
pub fn run(config_path: &Path, format: &str) -> Result<()> {
    let config = ViTConfig::from_yaml(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let summary = config
        .compute_summary()
        .with_context(|| "Configuration validation failed")?;
    let footprint = ActivationFootprint::new(&summary);

    match format {
        "json" => {
            let result = serde_json::json!({
                "config_path": config_path.display().to_string(),
                "architecture": {
                    "depth": summary.depth,
                    "dim": summary.dim,
                    "mlp_dim": summary.mlp_dim,
                    "heads": summary.heads,
                    "head_dim": summary.head_dim,
                    "num_classes": summary.num_classes,
                    "activation": format!("{:?}", summary.activation),
                    "pool": format!("{:?}", summary.pool),
                },
                "sequence": {
                    "num_patches": summary.num_patches,
                    "seq_length": summary.seq_length,
                },
                "parameters": {
                    "total": summary.total_params,
                    "patch_embed": summary.patch_embed_params,
                    "cls_token": summary.token_params,
                    "pos_encoding": summary.pos_enc_params,
                    "transformer": summary.transformer_params,
                    "per_layer": summary.params_per_layer,
                    "head": summary.head_params,
                    "bytes": summary.param_memory_bytes(),
                },
                "activations_per_image": {
                    "sequence_bytes": footprint.sequence_bytes,
                    "qkv_bytes": footprint.qkv_bytes,
                    "scores_per_head_bytes": footprint.scores_bytes,
                    "mlp_hidden_bytes": footprint.hidden_bytes,
                    "peak_bytes": footprint.peak_bytes(),
                },
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!("{}", summary.display());
            println!();
            println!("Activations (per image, f32):");
            println!("  Token sequence:     {:.2} MB", mb(footprint.sequence_bytes));
            println!("  QKV per block:      {:.2} MB", mb(footprint.qkv_bytes));
            println!("  Scores per head:    {:.2} MB", mb(footprint.scores_bytes));
            println!("  MLP hidden:         {:.2} MB", mb(footprint.hidden_bytes));
            println!("  Peak allocation:    {:.2} MB", mb(footprint.peak_bytes()));
        }
    }

    Ok(())
}
