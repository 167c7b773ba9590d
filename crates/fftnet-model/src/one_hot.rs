//! One-hot quantizer for class indices.

use candle_core::{DType, Device, Tensor};

use fftnet_core::{ClassIndex, FftNetError, FftNetResult};

/// Maps class indices in `[0, classes)` to one-hot rows of width `classes`.
///
/// Encoding is a row lookup into a cached identity matrix, so it works for
/// index tensors of any shape.
#[derive(Debug, Clone)]
pub struct OneHot {
    classes: usize,
    eye: Tensor,
}

impl OneHot {
    /// Create an encoder for `classes` quantization levels.
    pub fn new(classes: usize, device: &Device) -> FftNetResult<Self> {
        if classes < 2 {
            return Err(FftNetError::config(format!(
                "need at least 2 quantization levels, got {classes}"
            )));
        }
        let eye = Tensor::eye(classes, DType::F32, device).map_err(FftNetError::tensor)?;
        Ok(Self { classes, eye })
    }

    /// Number of quantization levels.
    pub fn classes(&self) -> usize {
        self.classes
    }

    /// Reject any index outside `[0, classes)`.
    pub fn validate(&self, indices: &[ClassIndex]) -> FftNetResult<()> {
        match indices.iter().find(|&&i| i as usize >= self.classes) {
            Some(&index) => Err(FftNetError::IndexOutOfRange {
                index,
                classes: self.classes,
            }),
            None => Ok(()),
        }
    }

    /// Encode a `u32` index tensor of shape `S` into `S ++ [classes]`.
    ///
    /// The whole tensor is checked before anything is built.
    pub fn encode(&self, indices: &Tensor) -> FftNetResult<Tensor> {
        if indices.dtype() != DType::U32 {
            return Err(FftNetError::shape(format!(
                "class indices must be u32, got {:?}",
                indices.dtype()
            )));
        }
        let flat = indices.flatten_all().map_err(FftNetError::tensor)?;
        let values = flat.to_vec1::<u32>().map_err(FftNetError::tensor)?;
        self.validate(&values)?;

        let mut shape = indices.dims().to_vec();
        shape.push(self.classes);
        self.eye
            .index_select(&flat, 0)
            .and_then(|rows| rows.reshape(shape))
            .map_err(FftNetError::tensor)
    }

    /// Encode a slice of indices into `(len, classes)`.
    pub fn encode_slice(&self, indices: &[ClassIndex]) -> FftNetResult<Tensor> {
        self.validate(indices)?;
        let ids = Tensor::new(indices, self.eye.device()).map_err(FftNetError::tensor)?;
        self.eye.index_select(&ids, 0).map_err(FftNetError::tensor)
    }

    /// Single class as a `(1, classes, 1)` column, ready for a layer buffer.
    pub fn encode_column(&self, class: ClassIndex) -> FftNetResult<Tensor> {
        self.validate(&[class])?;
        self.eye
            .narrow(0, class as usize, 1)
            .and_then(|row| row.reshape((1, self.classes, 1)))
            .map_err(FftNetError::tensor)
    }

    /// Device the identity table lives on.
    pub fn device(&self) -> &Device {
        self.eye.device()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_index_has_single_one() {
        let encoder = OneHot::new(8, &Device::Cpu).unwrap();
        let all: Vec<u32> = (0..8).collect();
        let rows = encoder.encode_slice(&all).unwrap().to_vec2::<f32>().unwrap();
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.iter().sum::<f32>(), 1.0);
            assert_eq!(row[i], 1.0);
        }
    }

    #[test]
    fn test_encode_appends_class_axis() {
        let encoder = OneHot::new(4, &Device::Cpu).unwrap();
        let ids = Tensor::new(&[[0u32, 3, 1], [2, 2, 0]], &Device::Cpu).unwrap();
        let encoded = encoder.encode(&ids).unwrap();
        assert_eq!(encoded.dims(), &[2, 3, 4]);
        let values = encoded.to_vec3::<f32>().unwrap();
        assert_eq!(values[0][1], vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(values[1][0], vec![0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let encoder = OneHot::new(4, &Device::Cpu).unwrap();
        let err = encoder.encode_slice(&[0, 4]).unwrap_err();
        assert!(matches!(
            err,
            FftNetError::IndexOutOfRange {
                index: 4,
                classes: 4
            }
        ));

        let ids = Tensor::new(&[1u32, 2, 9], &Device::Cpu).unwrap();
        assert!(encoder.encode(&ids).is_err());
        assert!(encoder.encode_column(4).is_err());
    }

    #[test]
    fn test_wrong_dtype_rejected() {
        let encoder = OneHot::new(4, &Device::Cpu).unwrap();
        let ids = Tensor::new(&[1f32, 2.0], &Device::Cpu).unwrap();
        assert!(matches!(
            encoder.encode(&ids),
            Err(FftNetError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_column_shape() {
        let encoder = OneHot::new(4, &Device::Cpu).unwrap();
        let column = encoder.encode_column(2).unwrap();
        assert_eq!(column.dims(), &[1, 4, 1]);
        let flat = column.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(flat, vec![0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_too_few_classes() {
        assert!(OneHot::new(1, &Device::Cpu).is_err());
    }
}
