//! # fftnet-model
//!
//! FFTNet vocoder on candle.
//!
//! This crate provides:
//! - One-hot quantizer with boundary checks
//! - The FFT layer (dilated causal convolution block) and the stacked network
//! - The conditioning pyramid that fixes padding and buffer sizes per layer
//! - Incremental generation with per-layer ring buffers
//! - Categorical and argmax sampling
//! - Checkpoint persistence and a training step
//!
//! # Example
//!
//! ```ignore
//! use candle_core::Device;
//! use fftnet_core::{GenerationInput, GenerationOptions, Vocoder};
//! use fftnet_model::checkpoint;
//!
//! let (model, _) = checkpoint::load("fftnet.safetensors", &Device::Cpu)?;
//! let options = GenerationOptions::new().with_seed(7);
//! let classes = model.generate(GenerationInput::Features(&features), &options)?;
//! ```

pub mod buffer;
pub mod checkpoint;
pub mod generate;
pub mod layers;
pub mod model;
pub mod one_hot;
pub mod pyramid;
pub mod sampling;
pub mod train;

pub use buffer::RingBuffer;
pub use checkpoint::CheckpointMeta;
pub use generate::GenerationSession;
pub use layers::FftLayer;
pub use model::{Conditioning, FftNet};
pub use one_hot::OneHot;
pub use pyramid::{ConditioningPyramid, LayerGeometry};
pub use sampling::Sampler;
pub use train::{Trainer, TrainingSegment};
