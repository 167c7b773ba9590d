//! Per-layer receptive fields, dilations and context lengths.
//!
//! Both the batch path (causal padding) and the incremental path (ring buffer
//! sizes) read their geometry from the same [`ConditioningPyramid`], so the two
//! can never disagree about how much trailing context a layer needs.

use fftnet_core::{FftNetError, FftNetResult, Orientation};

/// Geometry of one FFT layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerGeometry {
    /// Kernel size of the dilated convolution.
    pub radix: usize,
    /// Receptive field N of this layer.
    pub receptive_field: usize,
    /// Spacing between kernel taps, `N / radix`.
    pub dilation: usize,
}

impl LayerGeometry {
    /// Zeros prepended in the batch path, `N - N / radix`.
    pub fn padding(&self) -> usize {
        self.receptive_field - self.dilation
    }

    /// Trailing samples the layer reads to emit one output, `N - N / radix + 1`.
    pub fn context(&self) -> usize {
        self.padding() + 1
    }
}

/// Geometry of the whole stack, input layer first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditioningPyramid {
    layers: Vec<LayerGeometry>,
    receptive_field: usize,
    orientation: Orientation,
}

impl ConditioningPyramid {
    /// Derive the pyramid from a radix schedule.
    pub fn new(radixes: &[usize], orientation: Orientation) -> FftNetResult<Self> {
        if radixes.is_empty() {
            return Err(FftNetError::config("radix schedule must not be empty"));
        }
        if let Some(r) = radixes.iter().find(|r| **r < 2) {
            return Err(FftNetError::config(format!("radix {r} must be at least 2")));
        }

        let receptive_field = radixes
            .iter()
            .try_fold(1usize, |acc, &r| acc.checked_mul(r))
            .ok_or_else(|| FftNetError::config("receptive field overflows usize"))?;

        let fields: Vec<usize> = match orientation {
            Orientation::Suffix => (0..radixes.len())
                .map(|i| radixes[i..].iter().product())
                .collect(),
            Orientation::Prefix => (0..radixes.len())
                .map(|i| radixes[..=i].iter().product())
                .collect(),
        };

        let layers = fields
            .into_iter()
            .zip(radixes)
            .map(|(n, &r)| LayerGeometry {
                radix: r,
                receptive_field: n,
                dilation: n / r,
            })
            .collect();

        Ok(Self {
            layers,
            receptive_field,
            orientation,
        })
    }

    /// Per-layer geometry, input side first.
    pub fn layers(&self) -> &[LayerGeometry] {
        &self.layers
    }

    /// Number of layers.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Product of all radixes.
    pub fn receptive_field(&self) -> usize {
        self.receptive_field
    }

    /// Orientation the pyramid was built with.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Ring buffer length per layer.
    pub fn context_lengths(&self) -> Vec<usize> {
        self.layers.iter().map(LayerGeometry::context).collect()
    }

    /// Sum of all ring buffer lengths.
    pub fn total_context(&self) -> usize {
        self.layers.iter().map(LayerGeometry::context).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_pyramid() {
        let pyramid = ConditioningPyramid::new(&[2, 2, 2, 2], Orientation::Suffix).unwrap();
        assert_eq!(pyramid.receptive_field(), 16);
        let fields: Vec<usize> = pyramid.layers().iter().map(|l| l.receptive_field).collect();
        assert_eq!(fields, vec![16, 8, 4, 2]);
        let dilations: Vec<usize> = pyramid.layers().iter().map(|l| l.dilation).collect();
        assert_eq!(dilations, vec![8, 4, 2, 1]);
        assert_eq!(pyramid.context_lengths(), vec![9, 5, 3, 2]);
        assert_eq!(pyramid.total_context(), 19);
    }

    #[test]
    fn test_prefix_pyramid() {
        let pyramid = ConditioningPyramid::new(&[2, 2, 2, 2], Orientation::Prefix).unwrap();
        assert_eq!(pyramid.receptive_field(), 16);
        let fields: Vec<usize> = pyramid.layers().iter().map(|l| l.receptive_field).collect();
        assert_eq!(fields, vec![2, 4, 8, 16]);
        assert_eq!(pyramid.context_lengths(), vec![2, 3, 5, 9]);
    }

    #[test]
    fn test_dilation_times_radix_is_field() {
        for orientation in [Orientation::Suffix, Orientation::Prefix] {
            let pyramid = ConditioningPyramid::new(&[3, 2, 4, 2], orientation).unwrap();
            assert_eq!(pyramid.receptive_field(), 48);
            for layer in pyramid.layers() {
                assert_eq!(layer.dilation * layer.radix, layer.receptive_field);
            }
        }
    }

    #[test]
    fn test_padding_sums_to_receptive_field() {
        // The stacked causal paddings cover exactly R - 1 past samples.
        for orientation in [Orientation::Suffix, Orientation::Prefix] {
            let pyramid = ConditioningPyramid::new(&[2, 3, 2], orientation).unwrap();
            let padding: usize = pyramid.layers().iter().map(|l| l.padding()).sum();
            assert_eq!(padding + 1, pyramid.receptive_field());
        }
    }

    #[test]
    fn test_invalid_schedules() {
        assert!(ConditioningPyramid::new(&[], Orientation::Suffix).is_err());
        assert!(ConditioningPyramid::new(&[2, 1], Orientation::Suffix).is_err());
        assert!(ConditioningPyramid::new(&[usize::MAX, 2], Orientation::Prefix).is_err());
    }
}
