//! CLI entry point: classify one image and print the top label.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imagenet_classify::labels::DEFAULT_CLASS_MAP;
use imagenet_classify::{load_image, ClassMap, ClassificationPipeline, Device, InputSpec};

/// Classify an image with a pre-trained ONNX model and print the top-1 label.
#[derive(Parser, Debug)]
#[command(name = "imagenet-classify")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the serialized ONNX classification model.
    #[arg(value_name = "MODEL")]
    model: PathBuf,

    /// Input image. Defaults to the bundled sample.
    #[arg(value_name = "IMAGE", default_value = "assets/sample.png")]
    image: PathBuf,

    /// Execution device the model is compiled for.
    #[arg(long, default_value = "CPU", value_name = "DEVICE")]
    device: String,

    /// Class-index to label map (JSON array of strings).
    #[arg(long, default_value = DEFAULT_CLASS_MAP, value_name = "JSON")]
    labels: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("imagenet_classify={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(&args) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: &Args) -> Result<()> {
    // The image is read first so a bad image path fails before any model work.
    let image = load_image(&args.image)?;

    let device: Device = args.device.parse()?;
    let labels = ClassMap::from_path(&args.labels)?;

    let pipeline = ClassificationPipeline::new(&args.model, InputSpec::imagenet(), device, labels)
        .context("failed to build classification pipeline")?;

    let top = pipeline.classify(&image)?;

    println!("Result: {}", top.label);
    println!("Index: {}", top.index);

    Ok(())
}
