//! # audio-codec
//!
//! Waveform quantization and file I/O for the FFTNet vocoder.
//!
//! - Mu-law companding between float samples and class indices
//! - WAV export and import via `hound`

pub mod mulaw;
pub mod wav;

pub use mulaw::MuLaw;
pub use wav::{read_wav, write_wav, write_wav_samples};
