//! # runtime
//!
//! Runtime orchestration for the FFTNet vocoder.
//!
//! This crate provides:
//! - Checkpoint and feature-scaler loading
//! - Synthesis: normalize features, generate classes, expand mu-law
//! - Structured logging and metrics
//! - Device selection (CPU, CUDA, Metal)

pub mod device;
pub mod logging;
pub mod metrics;

use std::path::Path;
use std::time::Instant;

use candle_core::Device;
use tracing::{info, instrument, warn};

use audio_codec::MuLaw;
use features::Scaler;
use fftnet_core::{
    AudioChunk, FeatureMatrix, FftNetError, FftNetResult, GenerationConfig, GenerationInput,
    GenerationOptions, Vocoder,
};
use fftnet_model::{FftNet, checkpoint};

pub use device::{DevicePreference, device_name, select_device};
pub use logging::{LogFormat, init_logging};
pub use metrics::VocoderMetrics;

/// A loaded vocoder ready to turn features into audio.
#[derive(Debug)]
pub struct VocoderRuntime {
    model: FftNet,
    checkpoint_step: usize,
    scaler: Option<Scaler>,
    codec: MuLaw,
    generation: GenerationConfig,
    metrics: VocoderMetrics,
}

impl VocoderRuntime {
    /// Wrap an already built model.
    pub fn new(model: FftNet, generation: GenerationConfig) -> FftNetResult<Self> {
        let codec = MuLaw::new(model.classes())?;
        Ok(Self {
            model,
            checkpoint_step: 0,
            scaler: None,
            codec,
            generation,
            metrics: VocoderMetrics::new(),
        })
    }

    /// Load a checkpoint onto `device`.
    #[instrument(skip(device, generation), fields(path = %path.as_ref().display()))]
    pub fn load(
        path: impl AsRef<Path>,
        device: &Device,
        generation: GenerationConfig,
    ) -> FftNetResult<Self> {
        let (model, meta) = checkpoint::load(path, device)?;
        info!(
            step = meta.step,
            receptive_field = model.receptive_field(),
            parameters = model.parameter_count(),
            "Vocoder loaded on {}",
            device_name(device)
        );
        let mut runtime = Self::new(model, generation)?;
        runtime.checkpoint_step = meta.step;
        Ok(runtime)
    }

    /// Normalize conditioning with `scaler` before every synthesis.
    pub fn with_scaler(mut self, scaler: Scaler) -> FftNetResult<Self> {
        match self.model.aux_channels() {
            Some(channels) if channels == scaler.channels() => {}
            Some(channels) => {
                return Err(FftNetError::shape(format!(
                    "scaler has {} channels, model expects {channels}",
                    scaler.channels()
                )));
            }
            None => {
                return Err(FftNetError::config(
                    "feature scaler given to an unconditioned model",
                ));
            }
        }
        self.scaler = Some(scaler);
        Ok(self)
    }

    /// Read a scaler file and attach it.
    pub fn load_scaler(self, path: impl AsRef<Path>) -> FftNetResult<Self> {
        let scaler = Scaler::load(path)?;
        self.with_scaler(scaler)
    }

    pub fn model(&self) -> &FftNet {
        &self.model
    }

    /// Training step recorded in the checkpoint (0 for an in-memory model).
    pub fn checkpoint_step(&self) -> usize {
        self.checkpoint_step
    }

    pub fn scaler(&self) -> Option<&Scaler> {
        self.scaler.as_ref()
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation
    }

    /// Output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.generation.sample_rate
    }

    /// Options derived from the generation config.
    pub fn options(&self) -> GenerationOptions {
        GenerationOptions::from(&self.generation)
    }

    /// Features `(channels, frames)` to one sample per frame in `[-1, 1]`.
    pub fn synthesize(&self, features: &FeatureMatrix) -> FftNetResult<Vec<f32>> {
        self.synthesize_with(features, &self.options())
    }

    /// [`synthesize`](Self::synthesize) with explicit options.
    #[instrument(skip_all, fields(frames = features.frames(), channels = features.channels()))]
    pub fn synthesize_with(
        &self,
        features: &FeatureMatrix,
        options: &GenerationOptions,
    ) -> FftNetResult<Vec<f32>> {
        match &self.scaler {
            Some(scaler) => {
                let normalized = scaler.transformed(features)?;
                self.run(GenerationInput::Features(&normalized), options)
            }
            None => self.run(GenerationInput::Features(features), options),
        }
    }

    /// Free-running generation of `samples` samples.
    pub fn generate_unconditioned(&self, samples: usize) -> FftNetResult<Vec<f32>> {
        self.generate_unconditioned_with(samples, &self.options())
    }

    /// [`generate_unconditioned`](Self::generate_unconditioned) with explicit options.
    #[instrument(skip(self, options))]
    pub fn generate_unconditioned_with(
        &self,
        samples: usize,
        options: &GenerationOptions,
    ) -> FftNetResult<Vec<f32>> {
        self.run(GenerationInput::Samples(samples), options)
    }

    /// Package samples at the configured rate.
    pub fn to_chunk(&self, samples: Vec<f32>) -> AudioChunk {
        AudioChunk::new(samples, self.sample_rate())
    }

    fn run(&self, input: GenerationInput<'_>, options: &GenerationOptions) -> FftNetResult<Vec<f32>> {
        self.metrics.generation_started();
        let start = Instant::now();

        let classes = match self.model.generate(input, options) {
            Ok(classes) => classes,
            Err(e) => {
                if let FftNetError::Cancelled { step } = &e {
                    warn!("Generation cancelled at step {}", step);
                    self.metrics.generation_cancelled();
                } else {
                    self.metrics.generation_failed();
                }
                return Err(e);
            }
        };
        let samples = self.codec.decode_all(&classes)?;

        let elapsed = start.elapsed();
        let rtf = self
            .metrics
            .generation_completed(samples.len(), elapsed, self.sample_rate());
        info!(
            samples = samples.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            rtf,
            "Synthesis complete"
        );
        Ok(samples)
    }
}
