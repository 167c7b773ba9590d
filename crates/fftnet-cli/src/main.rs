//! FFTNet vocoder command-line interface.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use runtime::DevicePreference;

mod commands;

/// FFTNet vocoder CLI
#[derive(Debug, Parser)]
#[command(name = "fftnet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Log format (json or text)
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormatArg,

    /// Compute device (auto, cpu, cuda, metal)
    #[arg(long, default_value = "cpu", global = true)]
    device: DevicePreference,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Json,
    Text,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the layer layout of a model configuration
    Info {
        /// Configuration file (JSON); defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Generate a waveform from a checkpoint
    Generate {
        /// Model checkpoint (safetensors)
        #[arg(long)]
        checkpoint: PathBuf,

        /// Feature archive holding the conditioning utterance
        #[arg(long, requires = "id", conflicts_with = "samples")]
        archive: Option<PathBuf>,

        /// Utterance id inside the archive
        #[arg(long, requires = "archive")]
        id: Option<String>,

        /// Feature scaler applied before generation
        #[arg(long, requires = "archive")]
        scaler: Option<PathBuf>,

        /// Number of samples for free-running generation
        #[arg(long)]
        samples: Option<usize>,

        /// Logit multiplier before sampling
        #[arg(long, default_value = "1.0")]
        temperature: f32,

        /// Pick the most likely class instead of sampling
        #[arg(long)]
        argmax: bool,

        /// Random seed for deterministic generation
        #[arg(long)]
        seed: Option<u64>,

        /// Output file path (WAV format)
        #[arg(short, long)]
        output: PathBuf,

        /// Output sample rate in Hz
        #[arg(long, default_value = "16000")]
        sample_rate: u32,
    },

    /// Compute feature normalization statistics over an archive
    Stats {
        /// Feature archive (safetensors)
        #[arg(long)]
        archive: PathBuf,

        /// Where to write the scaler
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Train a model on an utterance archive
    Train {
        /// Feature archive (safetensors)
        #[arg(long)]
        archive: PathBuf,

        /// Configuration file (JSON) with model and training sections
        #[arg(short, long)]
        config: PathBuf,

        /// Directory for checkpoints
        #[arg(long)]
        checkpoint_dir: PathBuf,

        /// Feature scaler applied to training features
        #[arg(long)]
        scaler: Option<PathBuf>,

        /// Checkpoint to continue from
        #[arg(long)]
        resume: Option<PathBuf>,
    },

    /// Measure generation speed of a randomly initialized model
    Bench {
        /// Configuration file (JSON); defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Samples generated per iteration
        #[arg(short, long, default_value = "1600")]
        samples: usize,

        /// Number of iterations
        #[arg(short, long, default_value = "5")]
        iterations: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = match cli.log_format {
        LogFormatArg::Json => runtime::logging::LogFormat::Json,
        LogFormatArg::Text => runtime::logging::LogFormat::Text,
    };
    runtime::logging::init_logging(&cli.log_level, format);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting FFTNet CLI");

    match cli.command {
        Commands::Info { config } => {
            commands::info::run(config.as_deref()).context("info failed")?;
        }
        Commands::Generate {
            checkpoint,
            archive,
            id,
            scaler,
            samples,
            temperature,
            argmax,
            seed,
            output,
            sample_rate,
        } => {
            let source = match (archive, id, samples) {
                (Some(archive), Some(id), _) => commands::generate::Source::Archive {
                    archive,
                    id,
                    scaler,
                },
                (None, _, Some(samples)) => commands::generate::Source::Samples(samples),
                _ => anyhow::bail!("pass either --archive with --id, or --samples"),
            };
            let options = commands::generate::GenerateOptions {
                checkpoint,
                source,
                temperature,
                argmax,
                seed,
                output,
                sample_rate,
                device: cli.device,
            };
            commands::generate::run(&options).context("generation failed")?;
        }
        Commands::Stats { archive, output } => {
            commands::stats::run(&archive, &output).context("statistics failed")?;
        }
        Commands::Train {
            archive,
            config,
            checkpoint_dir,
            scaler,
            resume,
        } => {
            let options = commands::train::TrainOptions {
                archive,
                config,
                checkpoint_dir,
                scaler,
                resume,
                device: cli.device,
            };
            commands::train::run(&options).context("training failed")?;
        }
        Commands::Bench {
            config,
            samples,
            iterations,
        } => {
            commands::bench::run(config.as_deref(), samples, iterations, cli.device)
                .context("benchmark failed")?;
        }
    }

    Ok(())
}
