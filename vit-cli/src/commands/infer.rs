//! Infer command implementation.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use ndarray::Array3;
use rand::SeedableRng;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use tracing::info;
use vit_core::{Parameters, ViTConfig, ViTModel};

/// Run the infer command.
pub fn run(
    config_path: &Path,
    seed: u64,
    batch: usize,
    warmup: usize,
    iterations: usize,
    format: &str,
) -> Result<()> {
    if batch == 0 {
        bail!("--batch must be at least 1");
    }
    if iterations == 0 {
        bail!("--iterations must be at least 1");
    }

    let config = ViTConfig::from_yaml(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let build_start = Instant::now();
    let model = ViTModel::with_seed(config, seed)
        .with_context(|| format!("Failed to build model from {:?}", config_path))?;
    let build_ms = build_start.elapsed().as_secs_f64() * 1000.0;
    info!(params = model.num_parameters(), build_ms, "model ready");

    let images = random_images(model.config(), batch, seed);

    for i in 0..warmup {
        model
            .infer_batch(&images)
            .with_context(|| format!("Warmup iteration {} failed", i + 1))?;
    }

    let mut latencies = Vec::with_capacity(iterations);
    let mut logits = Vec::new();
    for i in 0..iterations {
        let start = Instant::now();
        let outputs = model
            .infer_batch(&images)
            .with_context(|| format!("Inference iteration {} failed", i + 1))?;
        latencies.push(start.elapsed().as_secs_f64() * 1000.0);
        info!(iteration = i + 1, latency_ms = latencies[i], "inference done");

        if i == 0 {
            logits = outputs[0].to_vec();
        }
    }

    let stats = LatencyStats::from_samples(&latencies);
    let throughput = batch as f64 / (stats.mean / 1000.0);

    match format {
        "json" => {
            let result = serde_json::json!({
                "config_path": config_path.display().to_string(),
                "seed": seed,
                "batch": batch,
                "parameters": model.num_parameters(),
                "build_ms": build_ms,
                "logits": logits,
                "latency_ms": {
                    "mean": stats.mean,
                    "std": stats.std,
                    "min": stats.min,
                    "max": stats.max,
                },
                "throughput": throughput,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            let config = model.config();
            println!("Inference Configuration:");
            println!("  Config: {:?}", config_path);
            println!("  Image: {0}x{1}x{1}", config.channels, config.image_size);
            println!("  Batch: {}", batch);
            println!("  Seed: {}", seed);
            println!("  Warmup: {}", warmup);
            println!("  Iterations: {}", iterations);
            println!();
            println!("Results:");
            println!("  Parameters: {}", model.num_parameters());
            println!("  Build time: {:.3} ms", build_ms);
            println!("  Logits (first image): {:?}", logits);
            println!("  Latency:");
            println!("    Mean:   {:.3} ms", stats.mean);
            println!("    Std:    {:.3} ms", stats.std);
            println!("    Min:    {:.3} ms", stats.min);
            println!("    Max:    {:.3} ms", stats.max);
            println!("  Throughput: {:.1} images/sec", throughput);
        }
    }

    Ok(())
}

/// Images with pixels uniform in `[-1, 1]`.
fn random_images(config: &ViTConfig, count: usize, seed: u64) -> Vec<Array3<f32>> {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    let dist = Uniform::new_inclusive(-1.0f32, 1.0);
    let shape = (config.channels, config.image_size, config.image_size);
    (0..count)
        .map(|_| Array3::from_shape_simple_fn(shape, || dist.sample(&mut rng)))
        .collect()
}

struct LatencyStats {
    mean: f64,
    std: f64,
    min: f64,
    max: f64,
}

impl LatencyStats {
    /// Sample statistics; `samples` must be non-empty.
    fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let std = if samples.len() > 1 {
            let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
            variance.sqrt()
        } else {
            0.0
        };
        let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Self { mean, std, min, max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_stats() {
        let stats = LatencyStats::from_samples(&[1.0, 2.0, 3.0]);
        assert!((stats.mean - 2.0).abs() < 1e-12);
        assert!((stats.std - 1.0).abs() < 1e-12);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 3.0);

        let single = LatencyStats::from_samples(&[4.0]);
        assert_eq!(single.std, 0.0);
    }

    #[test]
    fn test_random_images_match_config() {
        let config = ViTConfig::new(8, 4, 2, 8, 1, 2, 16, 0.0, 0.0).with_channels(2);
        let images = random_images(&config, 3, 9);
        assert_eq!(images.len(), 3);
        assert!(images.iter().all(|img| img.dim() == (2, 8, 8)));
        assert_ne!(images[0], images[1]);
        assert_eq!(images, random_images(&config, 3, 9));
    }
}
