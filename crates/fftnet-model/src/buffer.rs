//! Fixed-length trailing context for one layer during generation.

use candle_core::{D, DType, Device, Result, Tensor, bail};

/// Holds the most recent `len` input columns of one layer, oldest first.
///
/// Every push drops the oldest column and appends the newest one, so the
/// length never changes during a run.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: Tensor,
}

impl RingBuffer {
    /// All-zero buffer of shape `(1, channels, len)`.
    pub fn zeros(channels: usize, len: usize, device: &Device) -> Result<Self> {
        let data = Tensor::zeros((1, channels, len), DType::F32, device)?;
        Ok(Self { data })
    }

    /// Shift left by one and append `column` of shape `(1, channels, 1)`.
    ///
    /// Any other shape is rejected and leaves the contents untouched.
    pub fn push(&mut self, column: &Tensor) -> Result<()> {
        let (_, channels, len) = self.data.dims3()?;
        if column.dims() != [1, channels, 1] {
            bail!(
                "ring buffer takes (1, {channels}, 1) columns, got {:?}",
                column.dims()
            );
        }
        self.data = if len == 1 {
            column.contiguous()?
        } else {
            let kept = self.data.narrow(D::Minus1, 1, len - 1)?;
            Tensor::cat(&[&kept, column], D::Minus1)?
        };
        Ok(())
    }

    /// Zero the contents in place of a fresh run.
    pub fn reset(&mut self) -> Result<()> {
        self.data = self.data.zeros_like()?;
        Ok(())
    }

    /// Current contents, `(1, channels, len)`.
    pub fn data(&self) -> &Tensor {
        &self.data
    }

    /// Number of columns held.
    pub fn len(&self) -> usize {
        self.data.dim(D::Minus1).unwrap_or(0)
    }

    /// Always false for a constructed buffer.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
