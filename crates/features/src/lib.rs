//! # features
//!
//! Training-side data for the FFTNet vocoder:
//!
//! - [`FeatureArchive`]: utterance id → mu-law waveform plus aligned
//!   conditioning features, persisted as safetensors
//! - [`RunningStats`]: mergeable per-channel mean/variance accumulation
//! - [`Scaler`]: feature normalization derived from those statistics
//! - [`corpus_stats`]: parallel statistics over a whole archive

pub mod archive;
pub mod stats;

pub use archive::{FeatureArchive, Segment, Utterance};
pub use stats::{RunningStats, Scaler, corpus_stats};
