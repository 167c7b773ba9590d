//! The FFTNet stack and its batch forward pass.

use candle_core::{DType, Device, Module, Result, Tensor};
use candle_nn::{Linear, VarBuilder, VarMap, linear};
use tracing::{debug, info, instrument};

use fftnet_core::{
    ClassIndex, FeatureMatrix, FftNetError, FftNetResult, GenerationInput, GenerationOptions,
    ModelConfig, Vocoder,
};

use crate::generate::GenerationSession;
use crate::layers::FftLayer;
use crate::one_hot::OneHot;
use crate::pyramid::ConditioningPyramid;

/// Whether the model consumes an auxiliary feature stream.
///
/// Fixed at construction; every forward call must match it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conditioning {
    /// Waveform only.
    Unconditioned,
    /// Waveform plus `channels` conditioning features per step.
    Auxiliary { channels: usize },
}

impl From<Option<usize>> for Conditioning {
    fn from(aux_channels: Option<usize>) -> Self {
        match aux_channels {
            Some(channels) => Conditioning::Auxiliary { channels },
            None => Conditioning::Unconditioned,
        }
    }
}

/// FFTNet vocoder.
#[derive(Debug)]
pub struct FftNet {
    /// Stacked FFT layers, input side first.
    layers: Vec<FftLayer>,
    /// Projection from hidden width to class logits.
    fc_out: Linear,
    one_hot: OneHot,
    pyramid: ConditioningPyramid,
    conditioning: Conditioning,
    config: ModelConfig,
    device: Device,
}

impl FftNet {
    /// Build the network from a validated config.
    ///
    /// Weights are read from `vb` under `fft_layers.<i>.*` and `fc_out.*`.
    #[instrument(skip(config, vb), fields(depth = config.radixes.len(), classes = config.classes))]
    pub fn new(config: ModelConfig, vb: VarBuilder) -> FftNetResult<Self> {
        config.validate()?;
        let device = vb.device().clone();
        let pyramid = ConditioningPyramid::new(&config.radixes, config.orientation)?;
        let one_hot = OneHot::new(config.classes, &device)?;

        let mut layers = Vec::with_capacity(pyramid.depth());
        for (i, geometry) in pyramid.layers().iter().enumerate() {
            let in_channels = if i == 0 {
                config.classes
            } else {
                config.fft_channels
            };
            debug!(
                "Building layer {}/{}: N={}, dilation={}",
                i + 1,
                pyramid.depth(),
                geometry.receptive_field,
                geometry.dilation
            );
            let layer = FftLayer::new(
                in_channels,
                config.fft_channels,
                config.aux_channels,
                *geometry,
                vb.pp(format!("fft_layers.{i}")),
            )
            .map_err(FftNetError::tensor)?;
            layers.push(layer);
        }

        let fc_out = linear(config.fft_channels, config.classes, vb.pp("fc_out"))
            .map_err(FftNetError::tensor)?;

        info!(
            "FFTNet built: {} layers, receptive field {}, {} classes, orientation {}",
            layers.len(),
            pyramid.receptive_field(),
            config.classes,
            config.orientation
        );

        Ok(Self {
            layers,
            fc_out,
            one_hot,
            pyramid,
            conditioning: Conditioning::from(config.aux_channels),
            config,
            device,
        })
    }

    /// Build a freshly initialized, trainable network whose variables live in `varmap`.
    pub fn init(config: ModelConfig, varmap: &VarMap, device: &Device) -> FftNetResult<Self> {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
        Self::new(config, vb)
    }

    /// Architecture this model was built from.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Layer geometry.
    pub fn pyramid(&self) -> &ConditioningPyramid {
        &self.pyramid
    }

    /// Conditioning variant.
    pub fn conditioning(&self) -> Conditioning {
        self.conditioning
    }

    /// The quantizer feeding layer 0.
    pub fn one_hot(&self) -> &OneHot {
        &self.one_hot
    }

    /// Device the weights live on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    pub(crate) fn layers(&self) -> &[FftLayer] {
        &self.layers
    }

    /// Number of trainable scalars.
    pub fn parameter_count(&self) -> usize {
        let c = self.config.fft_channels;
        let q = self.config.classes;
        let aux = self.config.aux_channels.unwrap_or(0);
        let stack: usize = self
            .pyramid
            .layers()
            .iter()
            .enumerate()
            .map(|(i, g)| {
                let c_in = if i == 0 { q } else { c };
                let w_lr = c_in * c * g.radix + c;
                let v_lr = if aux > 0 { aux * c * g.radix + c } else { 0 };
                let w_o = c * c + c;
                w_lr + v_lr + w_o
            })
            .sum();
        stack + c * q + q
    }

    /// Batch forward pass over class indices.
    ///
    /// `x` is `(B, T)` u32, `h` is `(B, aux, T_h)` with `T_h >= T`; only the
    /// trailing `T` conditioning steps are used. Returns `(B, classes, T)`
    /// logits where step `t` depends on `x[..=t]` and the matching window of
    /// `h` only.
    #[instrument(skip_all, fields(shape = ?x.dims()))]
    pub fn forward(&self, x: &Tensor, h: Option<&Tensor>) -> FftNetResult<Tensor> {
        if x.rank() != 2 {
            return Err(FftNetError::shape(format!(
                "waveform batch must be (batch, time), got {:?}",
                x.dims()
            )));
        }
        let encoded = self
            .one_hot
            .encode(x)?
            .transpose(1, 2)
            .and_then(|t| t.contiguous())
            .map_err(FftNetError::tensor)?;
        self.forward_encoded(&encoded, h)
    }

    /// Batch forward pass over an already one-hot (or noisy) `(B, classes, T)` input.
    pub fn forward_encoded(&self, x: &Tensor, h: Option<&Tensor>) -> FftNetResult<Tensor> {
        let (batch, channels, steps) = x.dims3().map_err(FftNetError::tensor)?;
        if channels != self.config.classes {
            return Err(FftNetError::shape(format!(
                "input has {channels} channels, model expects {}",
                self.config.classes
            )));
        }
        let h = self.check_conditioning(h, batch, steps)?;
        self.run_stack(x, h)
    }

    fn run_stack(&self, x: &Tensor, h: Option<&Tensor>) -> FftNetResult<Tensor> {
        let mut z = x.clone();
        for layer in &self.layers {
            z = layer.forward(&z, h, true)?;
        }
        self.project(&z).map_err(FftNetError::tensor)
    }

    /// Map hidden `(B, C, T)` to logits `(B, classes, T)`.
    pub(crate) fn project(&self, z: &Tensor) -> Result<Tensor> {
        let z = z.transpose(1, 2)?.contiguous()?;
        self.fc_out.forward(&z)?.transpose(1, 2)?.contiguous()
    }

    /// Enforce the construction-time conditioning contract for a call.
    pub(crate) fn check_conditioning<'h>(
        &self,
        h: Option<&'h Tensor>,
        batch: usize,
        steps: usize,
    ) -> FftNetResult<Option<&'h Tensor>> {
        match (self.conditioning, h) {
            (Conditioning::Unconditioned, None) => Ok(None),
            (Conditioning::Unconditioned, Some(_)) => Err(FftNetError::UnexpectedConditioning),
            (Conditioning::Auxiliary { .. }, None) => Err(FftNetError::MissingConditioning),
            (Conditioning::Auxiliary { channels }, Some(h)) => {
                let (h_batch, h_channels, h_steps) = h.dims3().map_err(FftNetError::tensor)?;
                if h_batch != batch || h_channels != channels {
                    return Err(FftNetError::shape(format!(
                        "conditioning is {:?}, expected ({batch}, {channels}, >= {steps})",
                        h.dims()
                    )));
                }
                if h_steps < steps {
                    return Err(FftNetError::shape(format!(
                        "conditioning covers {h_steps} steps, waveform has {steps}"
                    )));
                }
                Ok(Some(h))
            }
        }
    }

    /// Upload a `(channels, frames)` feature matrix as a `(1, channels, frames)` tensor.
    pub fn conditioning_tensor(&self, h: &FeatureMatrix) -> FftNetResult<Tensor> {
        Tensor::from_slice(h.data(), (1, h.channels(), h.frames()), &self.device)
            .map_err(FftNetError::tensor)
    }

    /// Start an incremental generation run.
    pub fn session<'m>(
        &'m self,
        input: GenerationInput<'_>,
        options: &GenerationOptions,
    ) -> FftNetResult<GenerationSession<'m>> {
        GenerationSession::new(self, input, options)
    }
}

impl Vocoder for FftNet {
    fn classes(&self) -> usize {
        self.config.classes
    }

    fn receptive_field(&self) -> usize {
        self.pyramid.receptive_field()
    }

    fn aux_channels(&self) -> Option<usize> {
        self.config.aux_channels
    }

    #[instrument(skip_all, fields(samples = input.len(), policy = %options.policy))]
    fn generate(
        &self,
        input: GenerationInput<'_>,
        options: &GenerationOptions,
    ) -> FftNetResult<Vec<ClassIndex>> {
        self.session(input, options)?.run()
    }
}
