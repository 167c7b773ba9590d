//! Utterance archive.
//!
//! Each utterance pairs a mu-law waveform (`u8` classes) with conditioning
//! features holding one frame per sample. On disk the archive is a single
//! safetensors file: key `<id>` holds the `U8` waveform and key `<id>_h`
//! the `F32` `(channels, frames)` features.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rand::Rng;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use tracing::{debug, info, instrument};

use fftnet_core::{ClassIndex, FeatureMatrix, FftNetError, FftNetResult};

const FEATURE_SUFFIX: &str = "_h";

/// One recorded utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    waveform: Vec<u8>,
    features: FeatureMatrix,
}

/// An aligned training window cut from an utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub waveform: Vec<ClassIndex>,
    pub features: FeatureMatrix,
}

impl Utterance {
    /// Pair a waveform with features; frame count must equal sample count.
    pub fn new(waveform: Vec<u8>, features: FeatureMatrix) -> FftNetResult<Self> {
        if features.frames() != waveform.len() {
            return Err(FftNetError::shape(format!(
                "utterance has {} samples but {} feature frames",
                waveform.len(),
                features.frames()
            )));
        }
        Ok(Self { waveform, features })
    }

    /// Quantized samples.
    pub fn waveform(&self) -> &[u8] {
        &self.waveform
    }

    /// Samples widened to class indices.
    pub fn classes(&self) -> Vec<ClassIndex> {
        self.waveform.iter().map(|&c| ClassIndex::from(c)).collect()
    }

    /// Conditioning features.
    pub fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.waveform.len()
    }

    /// True for an empty utterance.
    pub fn is_empty(&self) -> bool {
        self.waveform.is_empty()
    }

    /// Samples and frames `[start, start + len)`.
    pub fn segment(&self, start: usize, len: usize) -> FftNetResult<Segment> {
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.len())
            .ok_or_else(|| {
                FftNetError::shape(format!(
                    "segment {start}+{len} exceeds utterance of {} samples",
                    self.len()
                ))
            })?;
        Ok(Segment {
            waveform: self.waveform[start..end]
                .iter()
                .map(|&c| ClassIndex::from(c))
                .collect(),
            features: self.features.slice_frames(start, len)?,
        })
    }

    /// Uniformly placed window of `len` samples, or None if the utterance is shorter.
    pub fn random_segment<R: Rng + ?Sized>(&self, len: usize, rng: &mut R) -> Option<Segment> {
        if len == 0 || len > self.len() {
            return None;
        }
        let start = rng.gen_range(0..=self.len() - len);
        self.segment(start, len).ok()
    }
}

/// In-memory archive keyed by utterance id.
#[derive(Debug, Clone, Default)]
pub struct FeatureArchive {
    utterances: BTreeMap<String, Utterance>,
}

impl FeatureArchive {
    /// Empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an utterance. All utterances must share the feature width.
    pub fn insert(&mut self, id: impl Into<String>, utterance: Utterance) -> FftNetResult<()> {
        let id = id.into();
        if id.is_empty() || id.ends_with(FEATURE_SUFFIX) {
            return Err(FftNetError::archive(format!(
                "invalid utterance id `{id}`: must be non-empty and not end in `{FEATURE_SUFFIX}`"
            )));
        }
        if let Some(channels) = self.channels() {
            if utterance.features.channels() != channels {
                return Err(FftNetError::shape(format!(
                    "utterance `{id}` has {} feature channels, archive has {channels}",
                    utterance.features.channels()
                )));
            }
        }
        self.utterances.insert(id, utterance);
        Ok(())
    }

    /// Look up an utterance.
    pub fn get(&self, id: &str) -> Option<&Utterance> {
        self.utterances.get(id)
    }

    /// Sorted utterance ids.
    pub fn ids(&self) -> Vec<&str> {
        self.utterances.keys().map(String::as_str).collect()
    }

    /// Number of utterances.
    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    /// True when the archive holds nothing.
    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    /// Feature width shared by all utterances.
    pub fn channels(&self) -> Option<usize> {
        self.utterances.values().next().map(|u| u.features.channels())
    }

    /// All utterances in id order.
    pub fn utterances(&self) -> impl Iterator<Item = &Utterance> {
        self.utterances.values()
    }

    /// Id/utterance pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Utterance)> {
        self.utterances.iter().map(|(id, u)| (id.as_str(), u))
    }

    /// Write the archive as safetensors.
    #[instrument(skip(self), fields(path = %path.as_ref().display(), utterances = self.len()))]
    pub fn save(&self, path: impl AsRef<Path>) -> FftNetResult<()> {
        let feature_bytes: Vec<(String, Vec<u8>)> = self
            .utterances
            .iter()
            .map(|(id, u)| (format!("{id}{FEATURE_SUFFIX}"), f32_bytes(u.features.data())))
            .collect();

        let mut views: Vec<(String, TensorView<'_>)> = Vec::with_capacity(self.len() * 2);
        for ((id, u), (key, bytes)) in self.utterances.iter().zip(&feature_bytes) {
            let wave = TensorView::new(Dtype::U8, vec![u.waveform.len()], &u.waveform)
                .map_err(|e| FftNetError::archive(e.to_string()))?;
            let h = TensorView::new(
                Dtype::F32,
                vec![u.features.channels(), u.features.frames()],
                bytes,
            )
            .map_err(|e| FftNetError::archive(e.to_string()))?;
            views.push((id.clone(), wave));
            views.push((key.clone(), h));
        }

        safetensors::serialize_to_file(views, &None, path.as_ref())
            .map_err(|e| FftNetError::archive(e.to_string()))?;
        info!("Saved {} utterances", self.len());
        Ok(())
    }

    /// Read an archive written by [`save`](Self::save).
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> FftNetResult<Self> {
        let path = path.as_ref();
        let buffer = std::fs::read(path).map_err(|e| FftNetError::ModelLoad {
            path: path.to_path_buf(),
            source: e,
        })?;
        let tensors =
            SafeTensors::deserialize(&buffer).map_err(|e| FftNetError::archive(e.to_string()))?;

        let mut waveforms: HashMap<String, Vec<u8>> = HashMap::new();
        let mut features: HashMap<String, FeatureMatrix> = HashMap::new();
        for (name, view) in tensors.tensors() {
            match (view.dtype(), name.strip_suffix(FEATURE_SUFFIX)) {
                (Dtype::U8, _) => {
                    waveforms.insert(name.clone(), view.data().to_vec());
                }
                (Dtype::F32, Some(id)) => {
                    let [channels, frames] = view.shape() else {
                        return Err(FftNetError::archive(format!(
                            "features `{name}` must be 2-D, got {:?}",
                            view.shape()
                        )));
                    };
                    let matrix = FeatureMatrix::new(*channels, *frames, f32_values(view.data()))?;
                    features.insert(id.to_string(), matrix);
                }
                (dtype, _) => {
                    return Err(FftNetError::archive(format!(
                        "unexpected entry `{name}` of type {dtype:?}"
                    )));
                }
            }
        }

        let mut archive = Self::new();
        for (id, waveform) in waveforms {
            let h = features
                .remove(&id)
                .ok_or_else(|| FftNetError::archive(format!("`{id}` has no features")))?;
            archive.insert(id, Utterance::new(waveform, h)?)?;
        }
        if let Some(orphan) = features.keys().next() {
            return Err(FftNetError::archive(format!(
                "features for `{orphan}` have no waveform"
            )));
        }

        debug!("Loaded {} utterances", archive.len());
        Ok(archive)
    }
}

pub(crate) fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn f32_values(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
