//! # fftnet-core
//!
//! Core types, traits, and error definitions for the FFTNet vocoder.
//!
//! This crate provides the foundational abstractions used across all other crates
//! in the workspace, including:
//!
//! - Common data types (`FeatureMatrix`, `AudioChunk`, `Orientation`, etc.)
//! - The `Vocoder` trait and per-call `GenerationOptions`
//! - Unified error handling via `FftNetError`
//! - Configuration structures

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{GenerationConfig, LoggingConfig, ModelConfig, TrainingConfig, VocoderConfig};
pub use error::{FftNetError, FftNetResult};
pub use traits::{GenerationInput, GenerationOptions, Vocoder};
pub use types::{AudioChunk, ClassIndex, FeatureMatrix, Orientation, SamplingPolicy};
