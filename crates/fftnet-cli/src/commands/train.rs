//! Train command implementation.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail, ensure};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use features::{FeatureArchive, Scaler, Utterance};
use fftnet_core::VocoderConfig;
use fftnet_model::{Trainer, TrainingSegment};
use runtime::{DevicePreference, select_device};

/// Steps between loss reports.
const LOG_INTERVAL: usize = 100;

/// Options for the train command.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub archive: PathBuf,
    pub config: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub scaler: Option<PathBuf>,
    pub resume: Option<PathBuf>,
    pub device: DevicePreference,
}

/// Run the train command.
pub fn run(options: &TrainOptions) -> Result<()> {
    let config = VocoderConfig::from_json_file(&options.config)
        .with_context(|| format!("failed to read {}", options.config.display()))?;
    let training = config.training.clone();
    ensure!(training.batch_size > 0, "batch_size must be positive");
    ensure!(training.segment_length > 0, "segment_length must be positive");

    let archive = FeatureArchive::load(&options.archive)
        .with_context(|| format!("failed to load archive {}", options.archive.display()))?;

    let device = select_device(options.device)?;
    let mut trainer = match &options.resume {
        Some(path) => Trainer::resume(path, training.clone(), &device)
            .with_context(|| format!("failed to resume from {}", path.display()))?,
        None => Trainer::new(config.model.clone(), training.clone(), &device)?,
    };
    // A resumed checkpoint carries its own model shape.
    let aux_channels = trainer.model().config().aux_channels;
    let conditioned = aux_channels.is_some();
    if let (Some(aux), Some(channels)) = (aux_channels, archive.channels()) {
        ensure!(
            aux == channels,
            "model expects {aux} feature channels, archive has {channels}"
        );
    }

    let scaler = options
        .scaler
        .as_deref()
        .map(Scaler::load)
        .transpose()
        .context("failed to load scaler")?;
    if scaler.is_some() && !conditioned {
        warn!("Scaler ignored: the model is unconditioned");
    }

    // One extra sample supplies the target of the last input.
    let window = training.segment_length + 1;
    let pool: Vec<&Utterance> = archive.utterances().filter(|u| u.len() >= window).collect();
    if pool.is_empty() {
        bail!("no utterance holds {window} samples");
    }
    info!(
        usable = pool.len(),
        total = archive.len(),
        window,
        "Training pool ready"
    );

    std::fs::create_dir_all(&options.checkpoint_dir).with_context(|| {
        format!("failed to create {}", options.checkpoint_dir.display())
    })?;

    let mut rng = match training.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let start = Instant::now();
    let mut running_loss = 0.0f64;
    let mut since_report = 0usize;
    while trainer.steps_taken() < training.training_steps {
        let batch = (0..training.batch_size)
            .map(|_| {
                let utterance = pool[rng.gen_range(0..pool.len())];
                draw_segment(utterance, window, conditioned, scaler.as_ref(), &mut rng)
            })
            .collect::<Result<Vec<_>>>()?;

        let loss = trainer.step_segments(&batch)?;
        running_loss += f64::from(loss);
        since_report += 1;

        let step = trainer.steps_taken();
        if step % LOG_INTERVAL == 0 {
            info!(
                step,
                loss = running_loss / since_report as f64,
                elapsed_s = start.elapsed().as_secs(),
                "Training progress"
            );
            running_loss = 0.0;
            since_report = 0;
        }
        if trainer.checkpoint_due() {
            save(&trainer, &options.checkpoint_dir)?;
        }
    }

    let path = save(&trainer, &options.checkpoint_dir)?;
    println!("Training finished at step {}", trainer.steps_taken());
    println!("Checkpoint: {}", path.display());
    Ok(())
}

fn draw_segment<R: Rng + ?Sized>(
    utterance: &Utterance,
    window: usize,
    conditioned: bool,
    scaler: Option<&Scaler>,
    rng: &mut R,
) -> Result<TrainingSegment> {
    let mut segment = utterance
        .random_segment(window, rng)
        .context("utterance shorter than the training window")?;
    let features = if conditioned {
        if let Some(scaler) = scaler {
            scaler.transform(&mut segment.features)?;
        }
        Some(segment.features)
    } else {
        None
    };
    Ok(TrainingSegment {
        waveform: segment.waveform,
        features,
    })
}

fn save(trainer: &Trainer, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(format!("fftnet_step{:08}.safetensors", trainer.steps_taken()));
    trainer
        .save_checkpoint(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fftnet_core::FeatureMatrix;

    fn write_inputs(dir: &Path, aux: Option<usize>) -> (PathBuf, PathBuf) {
        let mut archive = FeatureArchive::new();
        for (id, len) in [("long", 40usize), ("short", 5)] {
            let waveform = (0..len).map(|i| (i % 4) as u8).collect();
            let h = FeatureMatrix::zeros(aux.unwrap_or(2), len);
            archive.insert(id, Utterance::new(waveform, h).unwrap()).unwrap();
        }
        let archive_path = dir.join("train.safetensors");
        archive.save(&archive_path).unwrap();

        let aux = aux.map_or("null".to_string(), |a| a.to_string());
        let config = format!(
            r#"{{
                "model": {{ "radixes": [2, 2, 2], "fft_channels": 4, "classes": 4,
                            "aux_channels": {aux} }},
                "training": {{ "batch_size": 2, "segment_length": 16, "training_steps": 3,
                               "checkpoint_interval": 2, "seed": 1 }}
            }}"#
        );
        let config_path = dir.join("train.json");
        std::fs::write(&config_path, config).unwrap();
        (archive_path, config_path)
    }

    fn options(dir: &Path, aux: Option<usize>) -> TrainOptions {
        let (archive, config) = write_inputs(dir, aux);
        TrainOptions {
            archive,
            config,
            checkpoint_dir: dir.join("ckpt"),
            scaler: None,
            resume: None,
            device: DevicePreference::Cpu,
        }
    }

    #[test]
    fn test_training_writes_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path(), None);
        run(&opts).unwrap();
        assert!(opts.checkpoint_dir.join("fftnet_step00000002.safetensors").exists());
        assert!(opts.checkpoint_dir.join("fftnet_step00000003.safetensors").exists());
    }

    #[test]
    fn test_conditioned_training_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path(), Some(3));
        run(&opts).unwrap();

        // Already past training_steps: resuming only rewrites the final checkpoint.
        let resumed = TrainOptions {
            resume: Some(opts.checkpoint_dir.join("fftnet_step00000003.safetensors")),
            ..opts.clone()
        };
        run(&resumed).unwrap();
    }

    #[test]
    fn test_window_longer_than_every_utterance() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path(), None);
        let config = std::fs::read_to_string(&opts.config)
            .unwrap()
            .replace("\"segment_length\": 16", "\"segment_length\": 100");
        opts.config = dir.path().join("long.json");
        std::fs::write(&opts.config, config).unwrap();
        assert!(run(&opts).is_err());
    }

    #[test]
    fn test_resume_checks_checkpoint_channels() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path(), Some(3));
        run(&opts).unwrap();

        // Unconditioned config and a 2-channel archive against a 3-channel checkpoint.
        let other = dir.path().join("other");
        std::fs::create_dir_all(&other).unwrap();
        let (archive, config) = write_inputs(&other, None);
        let resumed = TrainOptions {
            archive,
            config,
            checkpoint_dir: other.join("ckpt"),
            resume: Some(opts.checkpoint_dir.join("fftnet_step00000003.safetensors")),
            ..opts.clone()
        };
        let err = run(&resumed).unwrap_err();
        assert!(err.to_string().contains("feature channels"));
        assert!(!resumed.checkpoint_dir.exists());
    }
}
