//! Validate command implementation.

use std::path::Path;

use anyhow::{Context, Result, ensure};
use vit_core::{Parameters, ViTConfig, ViTModel};

/// A derived quantity that holds for a valid config, with how it was obtained.
struct Invariant {
    name: &'static str,
    detail: String,
}

fn invariants(config: &ViTConfig) -> Vec<Invariant> {
    vec![
        Invariant {
            name: "patch grid",
            detail: format!(
                "{} / {} = {} patches per side",
                config.image_size,
                config.patch_size,
                config.grid_size()
            ),
        },
        Invariant {
            name: "sequence length",
            detail: format!("{}^2 + 1 class token = {}", config.grid_size(), config.seq_length()),
        },
        Invariant {
            name: "head width",
            detail: format!("{} / {} heads = {}", config.dim, config.heads, config.head_dim()),
        },
        Invariant {
            name: "patch width",
            detail: format!(
                "{} x {} x {} = {} -> dim {}",
                config.channels,
                config.patch_size,
                config.patch_size,
                config.patch_dim(),
                config.dim
            ),
        },
        Invariant {
            name: "encoder",
            detail: if config.depth == 0 {
                "depth 0, identity pass-through".to_string()
            } else {
                format!("{} blocks, mlp_dim {}", config.depth, config.mlp_dim)
            },
        },
    ]
}

/// Run the validate command.
///
/// With `build`, the model is also instantiated and its live parameter count
/// checked against the summary.
pub fn run(config_path: &Path, format: &str, build: bool) -> Result<()> {
    let config = ViTConfig::from_yaml(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    config
        .validate()
        .with_context(|| "Configuration validation failed")?;

    let built_params = if build {
        let expected = config.compute_summary()?.total_params;
        let model = ViTModel::new(config.clone())
            .with_context(|| format!("Failed to build model from {:?}", config_path))?;
        let actual = model.num_parameters();
        ensure!(
            actual == expected,
            "built model has {actual} parameters, summary expects {expected}"
        );
        Some(actual)
    } else {
        None
    };

    let checks = invariants(&config);
    match format {
        "json" => {
            let checks: serde_json::Map<_, _> = checks
                .iter()
                .map(|c| (c.name.to_string(), serde_json::Value::from(c.detail.clone())))
                .collect();
            let result = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "num_patches": config.num_patches(),
                "seq_length": config.seq_length(),
                "head_dim": config.head_dim(),
                "patch_dim": config.patch_dim(),
                "num_classes": config.num_classes,
                "invariants": checks,
                "built_params": built_params,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!("Config is valid: {:?}", config_path);
            for check in &checks {
                println!("  {:<16} {}", format!("{}:", check.name), check.detail);
            }
            println!("  {:<16} {}", "classes:", config.num_classes);
            if let Some(params) = built_params {
                println!("  {:<16} {} parameters", "built:", params);
            }
        }
    }

    Ok(())
}
