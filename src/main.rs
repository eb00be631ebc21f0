use std::path::{Path, PathBuf};

#[cfg(not(feature = "wgpu"))]
use burn::backend::NdArray;
#[cfg(feature = "wgpu")]
use burn::backend::Wgpu;
use burn::backend::Autodiff;
use clap::{Parser, Subcommand};
use mindsight::{
    FeatureExtractor, InferencePipeline, PipelineConfig, dataset::LabelTable, train_model,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[cfg(not(feature = "wgpu"))]
type Backend = NdArray<f32>;
#[cfg(feature = "wgpu")]
type Backend = Wgpu;

type TrainBackend = Autodiff<Backend>;

#[derive(Parser)]
#[command(name = "mindsight", about = "Depression risk estimation from speech (research use only)")]
struct Cli {
    /// TOML file overriding the default pipeline settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract the MFCC sequence of a recording
    Extract {
        audio: PathBuf,
        /// Write the feature grid as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Describe a split's label table
    Summary {
        base: PathBuf,
        #[arg(long, default_value = "train")]
        split: String,
    },
    /// Train on `<base>/audio` and `<base>/Labels`, then save the model
    Train { base: PathBuf },
    /// Predict the risk of one recording
    Predict {
        audio: PathBuf,
        /// Write the coefficient-by-time grid as JSON for rendering
        #[arg(long)]
        heatmap: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct Heatmap<'a> {
    coefficient_names: &'a [String],
    /// [coefficient][time]
    values: Vec<Vec<f32>>,
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer(std::io::BufWriter::new(file), value)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::from_toml_file(path)?,
        None => PipelineConfig::default(),
    };
    let device = Default::default();

    match cli.command {
        Command::Extract { audio, output } => {
            let extractor = FeatureExtractor::new(config.sample_rate, config.max_len);
            let features = extractor.extract(&audio)?;
            let [time, coeffs] = features.shape();
            println!("{}: {time} frames × {coeffs} coefficients", audio.display());
            if let Some(output) = output {
                let names = extractor.coefficient_names();
                write_json(
                    &output,
                    &Heatmap {
                        coefficient_names: &names,
                        values: features.heatmap(),
                    },
                )?;
            }
        }
        Command::Summary { base, split } => {
            let summary = LabelTable::load(&base, &split)?.summary();
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Train { base } => {
            let report = train_model::<TrainBackend>(&config, &base, &device)?;
            if let Some(accuracy) = report.final_validation_accuracy() {
                println!("Final validation accuracy: {:.1}%", accuracy * 100.0);
            }
            println!("Model saved to {}", config.model_path.display());
        }
        Command::Predict { audio, heatmap } => {
            let pipeline = InferencePipeline::<Backend>::new(&config, device);
            let result = pipeline.predict(&audio)?;
            println!(
                "Depression risk: {} ({:.1}% confidence)",
                result.label,
                result.confidence * 100.0
            );
            if let Some(heatmap) = heatmap {
                write_json(
                    &heatmap,
                    &Heatmap {
                        coefficient_names: &result.coefficient_names,
                        values: result.heatmap(),
                    },
                )?;
            }
        }
    }

    Ok(())
}
