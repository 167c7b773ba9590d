//! Training on ground-truth waveforms: each step predicts sample `t + 1`
//! from the true samples up to `t`.

use std::path::Path;

use candle_core::{Device, Tensor};
use candle_nn::loss::cross_entropy;
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use tracing::{debug, info, instrument};

use fftnet_core::{ClassIndex, FeatureMatrix, FftNetError, FftNetResult, ModelConfig, TrainingConfig};

use crate::checkpoint;
use crate::model::FftNet;

/// One training window.
///
/// `waveform` holds `T + 1` classes; `features`, when present, holds
/// `T + 1` frames aligned with it.
#[derive(Debug, Clone)]
pub struct TrainingSegment {
    pub waveform: Vec<ClassIndex>,
    pub features: Option<FeatureMatrix>,
}

/// Owns the trainable variables, the model built over them and the optimizer.
pub struct Trainer {
    model: FftNet,
    varmap: VarMap,
    optimizer: AdamW,
    config: TrainingConfig,
    steps: usize,
}

impl Trainer {
    /// Fresh, randomly initialized model.
    pub fn new(
        model_config: ModelConfig,
        config: TrainingConfig,
        device: &Device,
    ) -> FftNetResult<Self> {
        let varmap = VarMap::new();
        let model = FftNet::init(model_config, &varmap, device)?;
        Self::assemble(model, varmap, config, 0)
    }

    /// Continue from a checkpoint written by [`save_checkpoint`](Self::save_checkpoint).
    pub fn resume(
        path: impl AsRef<Path>,
        config: TrainingConfig,
        device: &Device,
    ) -> FftNetResult<Self> {
        let path = path.as_ref();
        let buffer = std::fs::read(path).map_err(|e| FftNetError::ModelLoad {
            path: path.to_path_buf(),
            source: e,
        })?;
        let meta = checkpoint::read_meta(&buffer)?;
        let varmap = VarMap::new();
        let model = FftNet::init(meta.config, &varmap, device)?;
        let meta = checkpoint::load_into(path, &varmap)?;
        info!("Resuming training from step {}", meta.step);
        Self::assemble(model, varmap, config, meta.step)
    }

    fn assemble(
        model: FftNet,
        varmap: VarMap,
        config: TrainingConfig,
        steps: usize,
    ) -> FftNetResult<Self> {
        let params = ParamsAdamW {
            lr: config.learning_rate,
            ..Default::default()
        };
        let optimizer = AdamW::new(varmap.all_vars(), params).map_err(FftNetError::tensor)?;
        Ok(Self {
            model,
            varmap,
            optimizer,
            config,
            steps,
        })
    }

    /// The model being trained.
    pub fn model(&self) -> &FftNet {
        &self.model
    }

    /// Optimizer steps applied so far, including those before a resume.
    pub fn steps_taken(&self) -> usize {
        self.steps
    }

    /// Training settings.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// True when the step count has just reached a checkpoint boundary.
    pub fn checkpoint_due(&self) -> bool {
        self.config.checkpoint_interval > 0
            && self.steps > 0
            && self.steps % self.config.checkpoint_interval == 0
    }

    /// One optimizer step.
    ///
    /// `waveform` is `(B, T + 1)` u32: positions `..T` are inputs and
    /// `1..` are targets. `features` is `(B, aux, T + 1)`; the forward pass
    /// uses its trailing `T` frames so frame `i + 1` conditions the
    /// prediction of sample `i + 1`. Returns the mean cross-entropy.
    #[instrument(skip_all, fields(step = self.steps))]
    pub fn step(&mut self, waveform: &Tensor, features: Option<&Tensor>) -> FftNetResult<f32> {
        let (batch, len) = waveform.dims2().map_err(FftNetError::tensor)?;
        if len < 2 {
            return Err(FftNetError::shape(format!(
                "training segment needs at least 2 samples, got {len}"
            )));
        }
        let steps = len - 1;
        let classes = self.model.config().classes;

        let inputs = waveform.narrow(1, 0, steps).map_err(FftNetError::tensor)?;
        let targets = waveform
            .narrow(1, 1, steps)
            .and_then(|t| t.flatten_all())
            .map_err(FftNetError::tensor)?;
        self.model.one_hot().validate(
            &targets
                .to_vec1::<u32>()
                .map_err(FftNetError::tensor)?,
        )?;

        let mut x = self
            .model
            .one_hot()
            .encode(&inputs)?
            .transpose(1, 2)
            .and_then(|t| t.contiguous())
            .map_err(FftNetError::tensor)?;
        if self.config.noise_injecting {
            let noise = Tensor::randn(0f32, 1.0 / classes as f32, x.dims(), x.device())
                .map_err(FftNetError::tensor)?;
            x = (x + noise).map_err(FftNetError::tensor)?;
        }

        let logits = self.model.forward_encoded(&x, features)?;
        let loss = logits
            .transpose(1, 2)
            .and_then(|t| t.contiguous())
            .and_then(|t| t.reshape((batch * steps, classes)))
            .and_then(|t| cross_entropy(&t, &targets))
            .map_err(FftNetError::tensor)?;

        let value = loss.to_scalar::<f32>().map_err(FftNetError::tensor)?;
        if !value.is_finite() {
            return Err(FftNetError::training(format!(
                "non-finite loss at step {}",
                self.steps
            )));
        }

        self.optimizer
            .backward_step(&loss)
            .map_err(|e| FftNetError::training(e.to_string()))?;
        self.steps += 1;
        debug!("step {} loss {:.4}", self.steps, value);
        Ok(value)
    }

    /// Stack equally sized segments into a batch and take one step.
    pub fn step_segments(&mut self, segments: &[TrainingSegment]) -> FftNetResult<f32> {
        let (waveform, features) = self.collate(segments)?;
        self.step(&waveform, features.as_ref())
    }

    fn collate(&self, segments: &[TrainingSegment]) -> FftNetResult<(Tensor, Option<Tensor>)> {
        let first = segments
            .first()
            .ok_or_else(|| FftNetError::training("empty batch"))?;
        let len = first.waveform.len();
        let device = self.model.device();

        let mut samples = Vec::with_capacity(segments.len() * len);
        for segment in segments {
            if segment.waveform.len() != len {
                return Err(FftNetError::shape(format!(
                    "segments in a batch differ in length: {} vs {len}",
                    segment.waveform.len()
                )));
            }
            samples.extend_from_slice(&segment.waveform);
        }
        let waveform = Tensor::from_vec(samples, (segments.len(), len), device)
            .map_err(FftNetError::tensor)?;

        let features = match &first.features {
            None => {
                if segments.iter().any(|s| s.features.is_some()) {
                    return Err(FftNetError::shape("segments in a batch disagree on conditioning"));
                }
                None
            }
            Some(h0) => {
                let (channels, frames) = (h0.channels(), h0.frames());
                let mut values = Vec::with_capacity(segments.len() * channels * frames);
                for segment in segments {
                    let h = segment
                        .features
                        .as_ref()
                        .ok_or(FftNetError::MissingConditioning)?;
                    if h.channels() != channels || h.frames() != frames {
                        return Err(FftNetError::shape(format!(
                            "segment features are {}x{}, expected {channels}x{frames}",
                            h.channels(),
                            h.frames()
                        )));
                    }
                    values.extend_from_slice(h.data());
                }
                Some(
                    Tensor::from_vec(values, (segments.len(), channels, frames), device)
                        .map_err(FftNetError::tensor)?,
                )
            }
        };
        Ok((waveform, features))
    }

    /// Persist weights, config and the current step.
    pub fn save_checkpoint(&self, path: impl AsRef<Path>) -> FftNetResult<()> {
        checkpoint::save(path, &self.varmap, self.model.config(), self.steps)
    }
}
