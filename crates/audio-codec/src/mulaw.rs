//! Mu-law companding.
//!
//! Maps samples in `[-1, 1]` onto `classes` evenly spaced levels of the
//! companded signal, with `mu = classes - 1`.

use fftnet_core::{ClassIndex, FftNetError, FftNetResult};

/// Mu-law quantizer with a fixed number of levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MuLaw {
    classes: usize,
    mu: f32,
}

impl MuLaw {
    /// Quantizer with `classes` levels (256 for 8-bit mu-law).
    pub fn new(classes: usize) -> FftNetResult<Self> {
        if classes < 2 {
            return Err(FftNetError::config(format!(
                "mu-law needs at least 2 levels, got {classes}"
            )));
        }
        Ok(Self {
            classes,
            mu: (classes - 1) as f32,
        })
    }

    /// Number of levels.
    pub fn classes(&self) -> usize {
        self.classes
    }

    /// Compress and quantize one sample; input is clamped to `[-1, 1]`.
    pub fn encode(&self, sample: f32) -> ClassIndex {
        let x = if sample.is_nan() {
            0.0
        } else {
            sample.clamp(-1.0, 1.0)
        };
        let y = x.signum() * (1.0 + self.mu * x.abs()).ln() / (1.0 + self.mu).ln();
        let class = ((y + 1.0) / 2.0 * self.mu).round();
        class.clamp(0.0, self.mu) as ClassIndex
    }

    /// Encode a whole waveform.
    pub fn encode_all(&self, samples: &[f32]) -> Vec<ClassIndex> {
        samples.iter().map(|&s| self.encode(s)).collect()
    }

    /// Linear map of a class index onto `[-1, 1]`, without expansion.
    pub fn class_to_float(&self, class: ClassIndex) -> FftNetResult<f32> {
        self.check(class)?;
        Ok(class as f32 / self.mu * 2.0 - 1.0)
    }

    /// Expand a class index back to a sample in `[-1, 1]`.
    pub fn decode(&self, class: ClassIndex) -> FftNetResult<f32> {
        let y = self.class_to_float(class)?;
        Ok(y.signum() * ((1.0 + self.mu).powf(y.abs()) - 1.0) / self.mu)
    }

    /// Decode a whole class sequence.
    pub fn decode_all(&self, classes: &[ClassIndex]) -> FftNetResult<Vec<f32>> {
        classes.iter().map(|&c| self.decode(c)).collect()
    }

    fn check(&self, class: ClassIndex) -> FftNetResult<()> {
        if class as usize >= self.classes {
            return Err(FftNetError::IndexOutOfRange {
                index: class,
                classes: self.classes,
            });
        }
        Ok(())
    }
}
