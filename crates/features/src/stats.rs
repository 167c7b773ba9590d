//! Feature normalization statistics.
//!
//! [`RunningStats`] keeps per-channel count, mean and sum of squared
//! deviations. Partial results combine with the parallel update rule, so any
//! split of the corpus merged in any order gives the same mean and variance
//! up to rounding.

use std::collections::HashMap;
use std::path::Path;

use rayon::prelude::*;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use tracing::{info, instrument};

use fftnet_core::{FeatureMatrix, FftNetError, FftNetResult};

use crate::archive::{FeatureArchive, f32_bytes, f32_values};

/// Mergeable per-channel mean/variance accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl RunningStats {
    /// Empty accumulator for `channels` features.
    pub fn new(channels: usize) -> Self {
        Self {
            count: 0,
            mean: vec![0.0; channels],
            m2: vec![0.0; channels],
        }
    }

    /// Statistics of a single `(channels, frames)` matrix.
    pub fn from_matrix(matrix: &FeatureMatrix) -> Self {
        let frames = matrix.frames();
        let mut stats = Self::new(matrix.channels());
        if frames == 0 {
            return stats;
        }
        for c in 0..matrix.channels() {
            let row = matrix.row(c);
            let mean = row.iter().map(|&v| f64::from(v)).sum::<f64>() / frames as f64;
            let m2 = row
                .iter()
                .map(|&v| (f64::from(v) - mean).powi(2))
                .sum::<f64>();
            stats.mean[c] = mean;
            stats.m2[c] = m2;
        }
        stats.count = frames as u64;
        stats
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.mean.len()
    }

    /// Frames accumulated.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Add one frame (one value per channel).
    pub fn update_frame(&mut self, frame: &[f32]) -> FftNetResult<()> {
        self.check_channels(frame.len())?;
        self.count += 1;
        let n = self.count as f64;
        for ((mean, m2), &v) in self.mean.iter_mut().zip(&mut self.m2).zip(frame) {
            let v = f64::from(v);
            let delta = v - *mean;
            *mean += delta / n;
            *m2 += delta * (v - *mean);
        }
        Ok(())
    }

    /// Add every frame of a `(channels, frames)` matrix.
    pub fn update_matrix(&mut self, matrix: &FeatureMatrix) -> FftNetResult<()> {
        self.check_channels(matrix.channels())?;
        self.merge(&Self::from_matrix(matrix))
    }

    /// Fold another accumulator into this one.
    pub fn merge(&mut self, other: &RunningStats) -> FftNetResult<()> {
        self.check_channels(other.channels())?;
        if other.count == 0 {
            return Ok(());
        }
        if self.count == 0 {
            *self = other.clone();
            return Ok(());
        }
        let (na, nb) = (self.count as f64, other.count as f64);
        let n = na + nb;
        for c in 0..self.channels() {
            let delta = other.mean[c] - self.mean[c];
            self.mean[c] += delta * nb / n;
            self.m2[c] += other.m2[c] + delta * delta * na * nb / n;
        }
        self.count += other.count;
        Ok(())
    }

    /// Per-channel mean.
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Per-channel population variance (zero when empty).
    pub fn variance(&self) -> Vec<f64> {
        if self.count == 0 {
            return vec![0.0; self.channels()];
        }
        self.m2.iter().map(|m2| m2 / self.count as f64).collect()
    }

    /// Normalization derived from these statistics.
    pub fn to_scaler(&self) -> FftNetResult<Scaler> {
        if self.count == 0 {
            return Err(FftNetError::archive("no frames accumulated"));
        }
        let mean = self.mean.iter().map(|&m| m as f32).collect();
        let scale = self
            .variance()
            .iter()
            .map(|&v| if v > 0.0 { v.sqrt() as f32 } else { 1.0 })
            .collect();
        Scaler::new(mean, scale)
    }

    fn check_channels(&self, channels: usize) -> FftNetResult<()> {
        if channels != self.channels() {
            return Err(FftNetError::shape(format!(
                "statistics track {} channels, got {channels}",
                self.channels()
            )));
        }
        Ok(())
    }
}

/// Per-channel standardization `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq)]
pub struct Scaler {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

impl Scaler {
    /// Build from mean and scale vectors of equal length; scales must be positive.
    pub fn new(mean: Vec<f32>, scale: Vec<f32>) -> FftNetResult<Self> {
        if mean.len() != scale.len() {
            return Err(FftNetError::shape(format!(
                "mean has {} entries, scale has {}",
                mean.len(),
                scale.len()
            )));
        }
        if scale.iter().any(|&s| !(s.is_finite() && s > 0.0)) {
            return Err(FftNetError::config("scaler entries must be positive"));
        }
        Ok(Self { mean, scale })
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.mean.len()
    }

    /// Per-channel mean.
    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    /// Per-channel scale.
    pub fn scale(&self) -> &[f32] {
        &self.scale
    }

    /// Normalize a `(channels, frames)` matrix in place.
    pub fn transform(&self, matrix: &mut FeatureMatrix) -> FftNetResult<()> {
        if matrix.channels() != self.channels() {
            return Err(FftNetError::shape(format!(
                "scaler has {} channels, features have {}",
                self.channels(),
                matrix.channels()
            )));
        }
        let frames = matrix.frames();
        if frames == 0 {
            return Ok(());
        }
        for (c, row) in matrix.data_mut().chunks_exact_mut(frames).enumerate() {
            let (mean, scale) = (self.mean[c], self.scale[c]);
            for v in row {
                *v = (*v - mean) / scale;
            }
        }
        Ok(())
    }

    /// Normalized copy.
    pub fn transformed(&self, matrix: &FeatureMatrix) -> FftNetResult<FeatureMatrix> {
        let mut out = matrix.clone();
        self.transform(&mut out)?;
        Ok(out)
    }

    /// Write `mean` and `scale` as safetensors.
    pub fn save(&self, path: impl AsRef<Path>) -> FftNetResult<()> {
        let mean = f32_bytes(&self.mean);
        let scale = f32_bytes(&self.scale);
        let views = vec![
            (
                "mean",
                TensorView::new(Dtype::F32, vec![self.channels()], &mean)
                    .map_err(|e| FftNetError::archive(e.to_string()))?,
            ),
            (
                "scale",
                TensorView::new(Dtype::F32, vec![self.channels()], &scale)
                    .map_err(|e| FftNetError::archive(e.to_string()))?,
            ),
        ];
        let metadata = HashMap::from([("channels".to_string(), self.channels().to_string())]);
        safetensors::serialize_to_file(views, &Some(metadata), path.as_ref())
            .map_err(|e| FftNetError::archive(e.to_string()))
    }

    /// Read a scaler written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> FftNetResult<Self> {
        let path = path.as_ref();
        let buffer = std::fs::read(path).map_err(|e| FftNetError::ModelLoad {
            path: path.to_path_buf(),
            source: e,
        })?;
        let tensors =
            SafeTensors::deserialize(&buffer).map_err(|e| FftNetError::archive(e.to_string()))?;
        let read = |name: &str| -> FftNetResult<Vec<f32>> {
            let view = tensors
                .tensor(name)
                .map_err(|_| FftNetError::archive(format!("scaler lacks `{name}`")))?;
            if view.dtype() != Dtype::F32 {
                return Err(FftNetError::archive(format!("`{name}` must be f32")));
            }
            Ok(f32_values(view.data()))
        };
        Self::new(read("mean")?, read("scale")?)
    }
}

/// Statistics over every utterance's features, computed in parallel.
#[instrument(skip(archive), fields(utterances = archive.len()))]
pub fn corpus_stats(archive: &FeatureArchive) -> FftNetResult<RunningStats> {
    let channels = archive
        .channels()
        .ok_or_else(|| FftNetError::archive("archive is empty"))?;

    let utterances: Vec<_> = archive.utterances().collect();
    let stats = utterances
        .par_iter()
        .map(|u| Ok::<_, FftNetError>(RunningStats::from_matrix(u.features())))
        .try_reduce(
            || RunningStats::new(channels),
            |mut acc, part| {
                acc.merge(&part)?;
                Ok(acc)
            },
        )?;

    info!(
        "Accumulated {} frames over {} channels",
        stats.count(),
        channels
    );
    Ok(stats)
}
