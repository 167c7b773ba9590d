//! Configuration structures for the vocoder.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{FftNetError, FftNetResult};
use crate::types::{Orientation, SamplingPolicy};

/// Network architecture.
///
/// Everything needed to rebuild the layer layout exactly; checkpoints embed
/// this structure verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Branching factor of each layer, input side first.
    #[serde(default = "default_radixes")]
    pub radixes: Vec<usize>,
    /// Hidden width of every layer after the first.
    #[serde(default = "default_fft_channels")]
    pub fft_channels: usize,
    /// Number of quantization levels Q.
    #[serde(default = "default_classes")]
    pub classes: usize,
    /// Width of the auxiliary conditioning stream, if any.
    #[serde(default)]
    pub aux_channels: Option<usize>,
    /// Receptive-field orientation of the stack.
    #[serde(default)]
    pub orientation: Orientation,
}

fn default_radixes() -> Vec<usize> {
    vec![2; 11]
}

fn default_fft_channels() -> usize {
    128
}

fn default_classes() -> usize {
    256
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            radixes: default_radixes(),
            fft_channels: default_fft_channels(),
            classes: default_classes(),
            aux_channels: None,
            orientation: Orientation::default(),
        }
    }
}

impl ModelConfig {
    /// Small configuration for tests and smoke runs.
    pub fn tiny() -> Self {
        Self {
            radixes: vec![2, 2, 2],
            fft_channels: 4,
            classes: 4,
            aux_channels: None,
            orientation: Orientation::Suffix,
        }
    }

    /// Same architecture with an auxiliary input of the given width.
    pub fn with_aux_channels(mut self, aux_channels: usize) -> Self {
        self.aux_channels = Some(aux_channels);
        self
    }

    /// Same architecture with a different orientation.
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Check the construction-time invariants.
    pub fn validate(&self) -> FftNetResult<()> {
        if self.radixes.is_empty() {
            return Err(FftNetError::config("radix schedule must not be empty"));
        }
        if let Some((i, r)) = self.radixes.iter().enumerate().find(|(_, r)| **r < 2) {
            return Err(FftNetError::config(format!(
                "radix {r} at layer {i} must be at least 2"
            )));
        }
        if self.classes < 2 {
            return Err(FftNetError::config(format!(
                "need at least 2 quantization levels, got {}",
                self.classes
            )));
        }
        if u32::try_from(self.classes).is_err() {
            return Err(FftNetError::config("quantization level count exceeds u32"));
        }
        if self.fft_channels == 0 {
            return Err(FftNetError::config("fft_channels must be positive"));
        }
        if self.aux_channels == Some(0) {
            return Err(FftNetError::config(
                "aux_channels must be positive when present",
            ));
        }
        self.radixes
            .iter()
            .try_fold(1usize, |acc, &r| acc.checked_mul(r))
            .ok_or_else(|| FftNetError::config("receptive field overflows usize"))?;
        Ok(())
    }
}

/// Generation defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Multiplier applied to logits before sampling.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Sampling policy.
    #[serde(default)]
    pub policy: SamplingPolicy,
    /// Random seed (None = entropy).
    #[serde(default)]
    pub seed: Option<u64>,
    /// Output sample rate used for WAV export and real-time factor.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_temperature() -> f32 {
    1.0
}

fn default_sample_rate() -> u32 {
    16000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            policy: SamplingPolicy::default(),
            seed: None,
            sample_rate: default_sample_rate(),
        }
    }
}

/// Training settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Adam learning rate.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Segments per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Samples per training segment (excluding the shifted target).
    #[serde(default = "default_segment_length")]
    pub segment_length: usize,
    /// Total optimizer steps.
    #[serde(default = "default_training_steps")]
    pub training_steps: usize,
    /// Add Gaussian noise with std `1 / classes` to the one-hot input.
    #[serde(default = "default_noise_injecting")]
    pub noise_injecting: bool,
    /// Steps between checkpoints.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,
    /// Seed for segment selection.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_learning_rate() -> f64 {
    1e-3
}

fn default_batch_size() -> usize {
    5
}

fn default_segment_length() -> usize {
    5000
}

fn default_training_steps() -> usize {
    100_000
}

fn default_noise_injecting() -> bool {
    true
}

fn default_checkpoint_interval() -> usize {
    1000
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            batch_size: default_batch_size(),
            segment_length: default_segment_length(),
            training_steps: default_training_steps(),
            noise_injecting: default_noise_injecting(),
            checkpoint_interval: default_checkpoint_interval(),
            seed: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (json or text).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VocoderConfig {
    /// Architecture.
    #[serde(default)]
    pub model: ModelConfig,
    /// Generation defaults.
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Training settings.
    #[serde(default)]
    pub training: TrainingConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl VocoderConfig {
    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> FftNetResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| FftNetError::ModelLoad {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string.
    pub fn from_json(json: &str) -> FftNetResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.model.validate()?;
        Ok(config)
    }
}
