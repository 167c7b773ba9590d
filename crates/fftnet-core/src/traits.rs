//! Trait definitions for vocoder components.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::GenerationConfig;
use crate::error::FftNetResult;
use crate::types::{ClassIndex, FeatureMatrix, SamplingPolicy};

/// What drives a generation run.
#[derive(Debug, Clone, Copy)]
pub enum GenerationInput<'a> {
    /// Free-running: emit this many samples from a random seed sample.
    Samples(usize),
    /// Conditioned: one sample per conditioning frame.
    Features(&'a FeatureMatrix),
}

impl GenerationInput<'_> {
    /// Number of samples this input will produce.
    pub fn len(&self) -> usize {
        match self {
            GenerationInput::Samples(n) => *n,
            GenerationInput::Features(h) => h.frames(),
        }
    }

    /// True when no sample will be produced.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Autoregressive waveform generator.
///
/// Implementations turn conditioning (or nothing) into a sequence of
/// quantized amplitude classes.
pub trait Vocoder: Send + Sync {
    /// Number of quantization levels produced.
    fn classes(&self) -> usize;

    /// Raw input timesteps influencing one output sample.
    fn receptive_field(&self) -> usize;

    /// Width of the conditioning stream, None for free-running models.
    fn aux_channels(&self) -> Option<usize>;

    /// Generate class indices.
    ///
    /// # Arguments
    /// * `input` - Sample count or conditioning features
    /// * `options` - Temperature, sampling policy, seed and abort flag
    fn generate(
        &self,
        input: GenerationInput<'_>,
        options: &GenerationOptions,
    ) -> FftNetResult<Vec<ClassIndex>>;
}

/// Per-call generation options.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Multiplier applied to logits before sampling.
    pub temperature: f32,
    /// Sampling policy.
    pub policy: SamplingPolicy,
    /// Random seed for deterministic generation.
    pub seed: Option<u64>,
    /// Abort flag polled between steps.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            policy: SamplingPolicy::Categorical,
            seed: None,
            cancel: None,
        }
    }
}

impl From<&GenerationConfig> for GenerationOptions {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            policy: config.policy,
            seed: config.seed,
            cancel: None,
        }
    }
}

impl GenerationOptions {
    /// Create new generation options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the logit multiplier.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the sampling policy.
    pub fn with_policy(mut self, policy: SamplingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Attach an abort flag.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// True once the abort flag has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}
