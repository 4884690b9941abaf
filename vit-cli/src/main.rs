//! CLI tool for ViT config validation, summarization, and inference.

mod commands;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vit")]
#[command(author, version, about = "ViT model CLI for validation, summarization, and inference")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a ViT configuration file
    Validate {
        /// Path to the YAML configuration file
        config: PathBuf,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,

        /// Also build the model and check its parameter count
        #[arg(long)]
        build: bool,
    },

    /// Summarize a ViT model from its configuration
    Summarize {
        /// Path to the YAML configuration file
        config: PathBuf,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Build a model and time inference on random images
    Infer {
        /// Path to the YAML configuration file
        #[arg(long)]
        config: PathBuf,

        /// Seed for parameter initialization and input images
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Number of images per inference call
        #[arg(long, default_value = "1")]
        batch: usize,

        /// Number of warmup iterations
        #[arg(long, default_value = "1")]
        warmup: usize,

        /// Number of timed iterations
        #[arg(long, default_value = "3")]
        iterations: usize,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate {
            config,
            format,
            build,
        } => commands::validate::run(&config, &format, build),
        Commands::Summarize { config, format } => commands::summarize::run(&config, &format),
        Commands::Infer {
            config,
            seed,
            batch,
            warmup,
            iterations,
            format,
        } => commands::infer::run(&config, seed, batch, warmup, iterations, &format),
    }
}
