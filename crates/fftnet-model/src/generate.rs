//! Incremental sample-by-sample generation.
//!
//! A [`GenerationSession`] owns one [`RingBuffer`] per layer sized to that
//! layer's context length. Each step pushes the previous sample into the
//! first buffer and every layer's single new output column into the next
//! one, so a step costs one short convolution per layer regardless of how
//! many samples came before.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use candle_core::{D, DType, Result, Tensor};
use tracing::{debug, info};

use fftnet_core::{ClassIndex, FftNetError, FftNetResult, GenerationInput, GenerationOptions};

use crate::buffer::RingBuffer;
use crate::model::{Conditioning, FftNet};
use crate::sampling::Sampler;

const PROGRESS_INTERVAL: usize = 16_000;

/// State of one generation run.
///
/// Buffers are allocated fresh per session; two sessions over the same model
/// never share state.
#[derive(Debug)]
pub struct GenerationSession<'m> {
    model: &'m FftNet,
    buffers: Vec<RingBuffer>,
    /// Conditioning left-padded by the receptive field, `(1, aux, R + T)`.
    aux: Option<Tensor>,
    sampler: Sampler,
    temperature: f32,
    cancel: Option<Arc<AtomicBool>>,
    /// One-hot column fed into the first buffer on the next step.
    previous: Tensor,
    step: usize,
    total: usize,
    awaiting_sample: bool,
    /// Set by the first error once the buffers may be out of step.
    failed: bool,
}

impl<'m> GenerationSession<'m> {
    /// Prepare a run over `model`.
    ///
    /// Free-running models take `Samples(n)` and start from a random class;
    /// conditioned models take `Features(h)`, emit one sample per frame and
    /// start from silence.
    pub fn new(
        model: &'m FftNet,
        input: GenerationInput<'_>,
        options: &GenerationOptions,
    ) -> FftNetResult<Self> {
        let config = model.config();
        let classes = config.classes;
        let receptive_field = model.pyramid().receptive_field();
        let mut sampler = Sampler::new(options.policy, options.seed);

        let (aux, total, previous) = match (model.conditioning(), input) {
            (Conditioning::Unconditioned, GenerationInput::Samples(n)) => {
                let seed = sampler.random_class(classes);
                (None, n, model.one_hot().encode_column(seed)?)
            }
            (Conditioning::Auxiliary { channels }, GenerationInput::Features(h)) => {
                if h.channels() != channels {
                    return Err(FftNetError::shape(format!(
                        "conditioning has {} channels, model expects {channels}",
                        h.channels()
                    )));
                }
                let padded = model
                    .conditioning_tensor(h)?
                    .pad_with_zeros(D::Minus1, receptive_field, 0)
                    .map_err(FftNetError::tensor)?;
                let silence = Tensor::zeros((1, classes, 1), DType::F32, model.device())
                    .map_err(FftNetError::tensor)?;
                (Some(padded), h.frames(), silence)
            }
            (Conditioning::Unconditioned, GenerationInput::Features(_)) => {
                return Err(FftNetError::UnexpectedConditioning);
            }
            (Conditioning::Auxiliary { .. }, GenerationInput::Samples(_)) => {
                return Err(FftNetError::MissingConditioning);
            }
        };

        let buffers = model
            .pyramid()
            .layers()
            .iter()
            .enumerate()
            .map(|(i, geometry)| {
                let channels = if i == 0 {
                    classes
                } else {
                    config.fft_channels
                };
                RingBuffer::zeros(channels, geometry.context(), model.device())
            })
            .collect::<Result<Vec<_>>>()
            .map_err(FftNetError::tensor)?;

        Ok(Self {
            model,
            buffers,
            aux,
            sampler,
            temperature: options.temperature,
            cancel: options.cancel.clone(),
            previous,
            step: 0,
            total,
            awaiting_sample: false,
            failed: false,
        })
    }

    /// Replace the initial previous sample with a fixed class.
    pub fn with_seed_class(mut self, class: ClassIndex) -> FftNetResult<Self> {
        if self.step > 0 || self.awaiting_sample {
            return Err(FftNetError::internal(
                "seed class must be set before the first step",
            ));
        }
        self.previous = self.model.one_hot().encode_column(class)?;
        Ok(self)
    }

    /// Run the stack for the current step and return the raw logits.
    ///
    /// Returns `None` once all samples have been produced. The caller must
    /// hand the chosen class back through [`accept`](Self::accept) before the
    /// next call. Cancellation and any failure while computing end the
    /// session; later calls return an error.
    pub fn advance(&mut self) -> FftNetResult<Option<Vec<f32>>> {
        self.ensure_live()?;
        if self.awaiting_sample {
            return Err(FftNetError::internal(
                "advance called before the previous sample was accepted",
            ));
        }
        if self.step >= self.total {
            return Ok(None);
        }
        if self.is_cancelled() {
            return Err(self.fail(FftNetError::Cancelled { step: self.step }));
        }

        let logits = match self.compute_logits() {
            Ok(logits) => logits,
            Err(e) => return Err(self.fail(e)),
        };
        if logits.iter().any(|l| !l.is_finite()) {
            return Err(self.fail(FftNetError::NonFiniteLogits { step: self.step }));
        }
        self.awaiting_sample = true;
        Ok(Some(logits))
    }

    /// Feed the class chosen for the current step back in as the next input.
    pub fn accept(&mut self, class: ClassIndex) -> FftNetResult<()> {
        self.ensure_live()?;
        if !self.awaiting_sample {
            return Err(FftNetError::internal("no step is waiting for a sample"));
        }
        self.previous = self.model.one_hot().encode_column(class)?;
        self.awaiting_sample = false;
        self.step += 1;
        if self.step % PROGRESS_INTERVAL == 0 {
            debug!("Generated {}/{} samples", self.step, self.total);
        }
        Ok(())
    }

    /// Produce the next sample: advance, scale by temperature, sample, accept.
    pub fn step(&mut self) -> FftNetResult<Option<ClassIndex>> {
        let Some(logits) = self.advance()? else {
            return Ok(None);
        };
        let scaled: Vec<f32> = logits.iter().map(|l| l * self.temperature).collect();
        if scaled.iter().any(|l| !l.is_finite()) {
            self.awaiting_sample = false;
            return Err(self.fail(FftNetError::NonFiniteLogits { step: self.step }));
        }
        let class = self.sampler.sample(&scaled);
        self.accept(class)?;
        Ok(Some(class))
    }

    /// Drive the session to completion.
    pub fn run(mut self) -> FftNetResult<Vec<ClassIndex>> {
        let start = Instant::now();
        info!(
            "Starting generation: {} samples, receptive field {}",
            self.total,
            self.model.pyramid().receptive_field()
        );

        let mut samples = Vec::with_capacity(self.total);
        while let Some(class) = self.step()? {
            samples.push(class);
        }

        info!(
            "Generated {} samples in {:.2?}",
            samples.len(),
            start.elapsed()
        );
        Ok(samples)
    }

    /// Steps completed so far.
    pub fn steps_taken(&self) -> usize {
        self.step
    }

    /// Samples this session will produce in total.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Current ring buffer lengths, input layer first.
    pub fn buffer_lens(&self) -> Vec<usize> {
        self.buffers.iter().map(RingBuffer::len).collect()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// True once an error has ended this session.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    fn ensure_live(&self) -> FftNetResult<()> {
        if self.failed {
            return Err(FftNetError::internal(format!(
                "session ended by an earlier error at step {}",
                self.step
            )));
        }
        Ok(())
    }

    fn fail(&mut self, err: FftNetError) -> FftNetError {
        self.failed = true;
        err
    }

    fn compute_logits(&mut self) -> FftNetResult<Vec<f32>> {
        let receptive_field = self.model.pyramid().receptive_field();
        let mut column = self.previous.clone();

        for (layer, buffer) in self.model.layers().iter().zip(self.buffers.iter_mut()) {
            buffer.push(&column).map_err(FftNetError::tensor)?;
            let context = buffer.len();
            // Frame `step` sits at `R + step` in the padded stream.
            let window = match &self.aux {
                Some(aux) => Some(
                    aux.narrow(D::Minus1, receptive_field + self.step + 1 - context, context)
                        .map_err(FftNetError::tensor)?,
                ),
                None => None,
            };
            column = layer.forward(buffer.data(), window.as_ref(), false)?;
        }

        self.model
            .project(&column)
            .and_then(|logits| logits.flatten_all())
            .and_then(|logits| logits.to_vec1::<f32>())
            .map_err(FftNetError::tensor)
    }
}

impl Iterator for GenerationSession<'_> {
    type Item = FftNetResult<ClassIndex>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.step().transpose()
    }
}
