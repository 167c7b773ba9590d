//! Unified error types for the vocoder.

use std::path::PathBuf;

/// Main error type for vocoder operations.
#[derive(Debug, thiserror::Error)]
pub enum FftNetError {
    /// Invalid model or runtime configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A class index fell outside `[0, classes)`.
    #[error("class index {index} out of range for {classes} quantization levels")]
    IndexOutOfRange { index: u32, classes: usize },

    /// Tensor or matrix shapes do not line up.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A conditioned model was called without auxiliary features.
    #[error("model expects auxiliary conditioning but none was provided")]
    MissingConditioning,

    /// An unconditioned model was handed auxiliary features.
    #[error("model has no auxiliary input but conditioning was provided")]
    UnexpectedConditioning,

    /// Logits contained NaN or infinity during generation.
    #[error("non-finite logits at generation step {step}")]
    NonFiniteLogits { step: usize },

    /// Generation was aborted through the cancellation flag.
    #[error("generation cancelled at step {step}")]
    Cancelled { step: usize },

    /// Checkpoint could not be read or written.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Feature archive is malformed.
    #[error("feature archive error: {0}")]
    Archive(String),

    /// Model file could not be opened.
    #[error("model load failed for {path}: {source}")]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Tensor backend failure.
    #[error("tensor error: {0}")]
    Tensor(String),

    /// Training step failure.
    #[error("training error: {0}")]
    Training(String),

    /// Audio encoding or decoding failure.
    #[error("audio error: {0}")]
    Audio(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen in normal operation).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results with FftNetError.
pub type FftNetResult<T> = Result<T, FftNetError>;

impl FftNetError {
    /// Create a configuration error with message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a shape mismatch error with message.
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    /// Create a checkpoint error with message.
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }

    /// Create an archive error with message.
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a tensor backend error from anything printable.
    pub fn tensor(err: impl std::fmt::Display) -> Self {
        Self::Tensor(err.to_string())
    }

    /// Create a training error with message.
    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    /// Create an audio error with message.
    pub fn audio(msg: impl Into<String>) -> Self {
        Self::Audio(msg.into())
    }

    /// Create an internal error with message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for failures a caller may retry, e.g. with a different seed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NonFiniteLogits { .. } | Self::Cancelled { .. })
    }
}

impl From<serde_json::Error> for FftNetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
