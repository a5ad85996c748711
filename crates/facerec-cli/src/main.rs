use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facerec_eval::PairIteration;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod pipeline;
mod report;

use config::Config;

#[derive(Parser)]
#[command(name = "facerec", about = "Face recognition pipeline: align, embed, evaluate")]
struct Cli {
    /// Directory containing the ONNX model files
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download any missing model files
    FetchModels,
    /// Embed the image dataset and report threshold and classifier accuracy
    Evaluate {
        /// Image root with one subdirectory per identity
        #[arg(long)]
        images: Option<PathBuf>,
        /// Write the full evaluation report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
        /// Visit every unordered pair once instead of the reference iteration
        #[arg(long)]
        unique_pairs: bool,
    },
    /// Distance between two face images and the match decision
    Verify {
        a: PathBuf,
        b: PathBuf,
        /// Squared-distance threshold below which the faces match
        #[arg(long, default_value_t = 0.5)]
        threshold: f32,
    },
    /// Predict the identity of a face image from the dataset
    Identify {
        image: PathBuf,
        #[arg(long)]
        images: Option<PathBuf>,
    },
    /// Write the aligned face crop of an image
    Align {
        image: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load().context("loading configuration")?;
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }

    match cli.command {
        Commands::FetchModels => {
            for path in pipeline::fetch_models(&config)? {
                println!("{}", path.display());
            }
        }
        Commands::Evaluate {
            images,
            report,
            unique_pairs,
        } => {
            if let Some(dir) = images {
                config.images_dir = dir;
            }
            if unique_pairs {
                config.pair_iteration = PairIteration::UniqueUnordered;
            }
            let result = pipeline::evaluate(&config)
                .with_context(|| format!("evaluating {}", config.images_dir.display()))?;
            print!("{result}");
            if let Some(path) = report {
                result
                    .write_json(&path)
                    .with_context(|| format!("writing report to {}", path.display()))?;
            }
        }
        Commands::Verify { a, b, threshold } => {
            let v = pipeline::verify(&config, &a, &b, threshold)?;
            println!(
                "distance = {:.4}, threshold = {:.2}: {}",
                v.distance,
                v.threshold,
                if v.matched { "same identity" } else { "different identities" }
            );
        }
        Commands::Identify { image, images } => {
            if let Some(dir) = images {
                config.images_dir = dir;
            }
            let identity = pipeline::identify(&config, &image)
                .with_context(|| format!("identifying {}", image.display()))?;
            println!("{identity}");
        }
        Commands::Align { image, output } => {
            pipeline::align(&config, &image, &output)
                .with_context(|| format!("aligning {}", image.display()))?;
            println!("{}", output.display());
        }
    }

    Ok(())
}
