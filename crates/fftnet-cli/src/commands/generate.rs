//! Generate command implementation.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;

use audio_codec::write_wav_samples;
use features::FeatureArchive;
use fftnet_core::{GenerationConfig, SamplingPolicy};
use runtime::{DevicePreference, VocoderRuntime, select_device};

/// What drives generation.
#[derive(Debug, Clone)]
pub enum Source {
    /// Condition on one utterance of a feature archive.
    Archive {
        archive: PathBuf,
        id: String,
        scaler: Option<PathBuf>,
    },
    /// Free-running generation of this many samples.
    Samples(usize),
}

/// Options for the generate command.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub checkpoint: PathBuf,
    pub source: Source,
    pub temperature: f32,
    pub argmax: bool,
    pub seed: Option<u64>,
    pub output: PathBuf,
    pub sample_rate: u32,
    pub device: DevicePreference,
}

/// Run the generate command.
pub fn run(options: &GenerateOptions) -> Result<()> {
    let start = Instant::now();
    let device = select_device(options.device)?;

    let generation = GenerationConfig {
        temperature: options.temperature,
        policy: if options.argmax {
            SamplingPolicy::Argmax
        } else {
            SamplingPolicy::Categorical
        },
        seed: options.seed,
        sample_rate: options.sample_rate,
    };
    let mut runtime = VocoderRuntime::load(&options.checkpoint, &device, generation)
        .with_context(|| format!("failed to load {}", options.checkpoint.display()))?;

    let gen_start = Instant::now();
    let audio = match &options.source {
        Source::Archive {
            archive,
            id,
            scaler,
        } => {
            if let Some(scaler) = scaler {
                runtime = runtime
                    .load_scaler(scaler)
                    .with_context(|| format!("failed to load scaler {}", scaler.display()))?;
            }
            let archive = FeatureArchive::load(archive)
                .with_context(|| format!("failed to load archive {}", archive.display()))?;
            let utterance = archive
                .get(id)
                .with_context(|| format!("utterance `{id}` not found in archive"))?;
            info!(id = %id, frames = utterance.features().frames(), "Conditioning on utterance");
            runtime.synthesize(utterance.features())?
        }
        Source::Samples(samples) => runtime.generate_unconditioned(*samples)?,
    };
    let gen_elapsed = gen_start.elapsed();

    write_wav_samples(&options.output, &audio, runtime.sample_rate())?;

    let audio_secs = audio.len() as f64 / f64::from(runtime.sample_rate());
    let rtf = runtime::metrics::real_time_factor(audio.len(), gen_elapsed, runtime.sample_rate());

    println!("Generation complete!");
    println!();
    println!("Checkpoint: {} (step {})", options.checkpoint.display(), runtime.checkpoint_step());
    println!("Output:     {}", options.output.display());
    println!();
    println!("Audio:");
    println!("  Duration:    {audio_secs:.2} sec");
    println!("  Samples:     {}", audio.len());
    println!("  Sample rate: {} Hz", runtime.sample_rate());
    println!();
    println!("Performance:");
    println!("  Generation:  {} ms", gen_elapsed.as_millis());
    println!("  Total:       {} ms", start.elapsed().as_millis());
    println!("  RTF:         {rtf:.3}x");

    info!(output = %options.output.display(), samples = audio.len(), "Audio saved to file");
    Ok(())
}
