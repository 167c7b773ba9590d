//! Core data types shared by the vocoder crates.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{FftNetError, FftNetResult};

/// A quantized amplitude level in `[0, classes)`.
pub type ClassIndex = u32;

/// Which end of the stack carries the full receptive field.
///
/// `Suffix` gives layer `i` the product of radixes from `i` to the end, so the
/// first layer sees the full receptive field and dilation shrinks towards the
/// output. `Prefix` uses the running product from the start instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Receptive field shrinks towards the output (dilation R/2, ..., 1).
    #[default]
    Suffix,
    /// Receptive field grows towards the output (dilation 1, ..., R/2).
    Prefix,
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Orientation::Suffix => write!(f, "suffix"),
            Orientation::Prefix => write!(f, "prefix"),
        }
    }
}

impl std::str::FromStr for Orientation {
    type Err = FftNetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "suffix" => Ok(Self::Suffix),
            "prefix" | "transpose" => Ok(Self::Prefix),
            _ => Err(FftNetError::config(format!("unknown orientation: {s}"))),
        }
    }
}

/// How a class index is drawn from a logit vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingPolicy {
    /// Softmax then draw proportionally to probability.
    #[default]
    Categorical,
    /// Pick the highest logit.
    Argmax,
}

impl std::fmt::Display for SamplingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SamplingPolicy::Categorical => write!(f, "categorical"),
            SamplingPolicy::Argmax => write!(f, "argmax"),
        }
    }
}

/// Real-valued `(channels × frames)` matrix stored row-major.
///
/// Conditioning features, normalization inputs and archive entries all use
/// this layout: row `c` holds channel `c` across time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    channels: usize,
    frames: usize,
    data: Vec<f32>,
}

impl FeatureMatrix {
    /// Wrap a row-major buffer, checking its length.
    pub fn new(channels: usize, frames: usize, data: Vec<f32>) -> FftNetResult<Self> {
        if data.len() != channels * frames {
            return Err(FftNetError::shape(format!(
                "feature buffer holds {} values, expected {channels} x {frames}",
                data.len()
            )));
        }
        Ok(Self {
            channels,
            frames,
            data,
        })
    }

    /// All-zero matrix.
    pub fn zeros(channels: usize, frames: usize) -> Self {
        Self {
            channels,
            frames,
            data: vec![0.0; channels * frames],
        }
    }

    /// Build from per-channel rows of equal length.
    pub fn from_rows(rows: &[Vec<f32>]) -> FftNetResult<Self> {
        let frames = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|row| row.len() != frames) {
            return Err(FftNetError::shape("feature rows have unequal lengths"));
        }
        let data = rows.iter().flatten().copied().collect();
        Self::new(rows.len(), frames, data)
    }

    /// Number of channels (rows).
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of time frames (columns).
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Raw row-major values.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable raw row-major values.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consume into the raw buffer.
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Values of one channel across time.
    pub fn row(&self, channel: usize) -> &[f32] {
        let start = channel * self.frames;
        &self.data[start..start + self.frames]
    }

    /// Copy out the values of all channels at one frame.
    pub fn frame(&self, frame: usize) -> Vec<f32> {
        (0..self.channels)
            .map(|c| self.data[c * self.frames + frame])
            .collect()
    }

    /// Copy of frames `[start, start + len)`.
    pub fn slice_frames(&self, start: usize, len: usize) -> FftNetResult<Self> {
        if start + len > self.frames {
            return Err(FftNetError::shape(format!(
                "frame window {start}..{} exceeds {} frames",
                start + len,
                self.frames
            )));
        }
        let mut data = Vec::with_capacity(self.channels * len);
        for c in 0..self.channels {
            data.extend_from_slice(&self.row(c)[start..start + len]);
        }
        Self::new(self.channels, len, data)
    }
}

/// A block of generated audio.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// PCM samples (f32, mono, in [-1, 1]).
    pub pcm: Arc<[f32]>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioChunk {
    /// Create a new audio chunk.
    pub fn new(pcm: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            pcm: pcm.into(),
            sample_rate,
        }
    }

    /// Duration in milliseconds.
    pub fn duration_ms(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.pcm.len() as f32 * 1000.0 / self.sample_rate as f32
    }

    /// Get the number of samples in this chunk.
    pub fn num_samples(&self) -> usize {
        self.pcm.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_parsing() {
        assert_eq!("suffix".parse::<Orientation>().unwrap(), Orientation::Suffix);
        assert_eq!("Prefix".parse::<Orientation>().unwrap(), Orientation::Prefix);
        assert_eq!(
            "transpose".parse::<Orientation>().unwrap(),
            Orientation::Prefix
        );
        assert!("sideways".parse::<Orientation>().is_err());
        assert_eq!(Orientation::default(), Orientation::Suffix);
    }

    #[test]
    fn test_policy_serde() {
        let json = serde_json::to_string(&SamplingPolicy::Argmax).unwrap();
        assert_eq!(json, "\"argmax\"");
        let policy: SamplingPolicy = serde_json::from_str("\"categorical\"").unwrap();
        assert_eq!(policy, SamplingPolicy::Categorical);
    }

    #[test]
    fn test_feature_matrix_layout() {
        let m = FeatureMatrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(m.channels(), 2);
        assert_eq!(m.frames(), 3);
        assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
        assert_eq!(m.frame(2), vec![3.0, 6.0]);

        let tail = m.slice_frames(1, 2).unwrap();
        assert_eq!(tail.data(), &[2.0, 3.0, 5.0, 6.0]);
        assert!(m.slice_frames(2, 2).is_err());
    }

    #[test]
    fn test_feature_matrix_rejects_bad_length() {
        assert!(FeatureMatrix::new(2, 3, vec![0.0; 5]).is_err());
        assert!(FeatureMatrix::from_rows(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_audio_chunk() {
        let chunk = AudioChunk::new(vec![0.0; 1600], 16000);
        assert_eq!(chunk.duration_ms(), 100.0);
        assert_eq!(chunk.num_samples(), 1600);
    }
}
