//! The FFT layer: a causal dilated convolution block.

use candle_core::{D, Module, Result, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, VarBuilder, conv1d};

use fftnet_core::{FftNetError, FftNetResult};

use crate::pyramid::LayerGeometry;

/// One FFT block.
///
/// `z = relu(w_lr(x) + v_lr(h))`, `out = relu(w_o(z))`, where `w_lr` and
/// `v_lr` span `radix` taps spaced `dilation` apart and `w_o` is pointwise.
#[derive(Debug, Clone)]
pub struct FftLayer {
    w_lr: Conv1d,
    v_lr: Option<Conv1d>,
    w_o: Conv1d,
    geometry: LayerGeometry,
}

impl FftLayer {
    /// Build a layer; `aux_channels` wires the conditioning branch.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        aux_channels: Option<usize>,
        geometry: LayerGeometry,
        vb: VarBuilder,
    ) -> Result<Self> {
        let dilated = Conv1dConfig {
            dilation: geometry.dilation,
            ..Default::default()
        };
        let w_lr = conv1d(
            in_channels,
            out_channels,
            geometry.radix,
            dilated,
            vb.pp("w_lr"),
        )?;
        let v_lr = aux_channels
            .map(|aux| conv1d(aux, out_channels, geometry.radix, dilated, vb.pp("v_lr")))
            .transpose()?;
        let w_o = conv1d(
            out_channels,
            out_channels,
            1,
            Conv1dConfig::default(),
            vb.pp("w_o"),
        )?;

        Ok(Self {
            w_lr,
            v_lr,
            w_o,
            geometry,
        })
    }

    /// Geometry this layer was built with.
    pub fn geometry(&self) -> &LayerGeometry {
        &self.geometry
    }

    /// True when the conditioning branch is wired.
    pub fn is_conditioned(&self) -> bool {
        self.v_lr.is_some()
    }

    /// Apply the layer to `x` of shape `(B, C_in, M)`.
    ///
    /// With `zeropad`, `x` and the trailing `M` steps of `h` are left-padded
    /// by `N - N/r` zeros, so the output has `M` causal steps. Without it the
    /// caller supplies the context itself and gets `M - N + N/r` steps back.
    ///
    /// `h` must be present exactly when the layer is conditioned and must
    /// cover at least the `M` steps of `x`.
    pub fn forward(&self, x: &Tensor, h: Option<&Tensor>, zeropad: bool) -> FftNetResult<Tensor> {
        let steps = x.dim(D::Minus1).map_err(FftNetError::tensor)?;
        let h = match (&self.v_lr, h) {
            (None, None) => None,
            (None, Some(_)) => return Err(FftNetError::UnexpectedConditioning),
            (Some(_), None) => return Err(FftNetError::MissingConditioning),
            (Some(_), Some(h)) => {
                let available = h.dim(D::Minus1).map_err(FftNetError::tensor)?;
                if available < steps {
                    return Err(FftNetError::shape(format!(
                        "conditioning covers {available} steps, layer input has {steps}"
                    )));
                }
                Some(
                    h.narrow(D::Minus1, available - steps, steps)
                        .map_err(FftNetError::tensor)?,
                )
            }
        };
        self.apply(x, h.as_ref(), zeropad).map_err(FftNetError::tensor)
    }

    fn apply(&self, x: &Tensor, h: Option<&Tensor>, zeropad: bool) -> Result<Tensor> {
        let pad = self.geometry.padding();
        let pad_if = |t: &Tensor| {
            if zeropad {
                t.pad_with_zeros(D::Minus1, pad, 0)
            } else {
                Ok(t.clone())
            }
        };

        let mut z = self.w_lr.forward(&pad_if(x)?)?;
        if let (Some(v_lr), Some(h)) = (&self.v_lr, h) {
            z = (z + v_lr.forward(&pad_if(h)?)?)?;
        }
        self.w_o.forward(&z.relu()?)?.relu()
    }
}
