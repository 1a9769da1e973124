//! Square convolution kernels and boundary policies.
//!
//! A [`Kernel`] is an immutable odd-sized matrix of `f32` weights stored
//! row-major. Weights are caller supplied; nothing requires them to sum to 1.
//! Sizes are limited to [`MAX_KERNEL_SIZE`] so halos stay a few rows deep.
use crate::error::FilterError;
use serde::{Deserialize, Serialize};

/// Largest accepted kernel edge (radius 3).
pub const MAX_KERNEL_SIZE: usize = 7;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawKernel", into = "RawKernel")]
pub struct Kernel {
    size: usize,
    weights: Vec<f32>,
}

/// Unvalidated wire/config form of a kernel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawKernel {
    pub size: usize,
    pub weights: Vec<f32>,
}

impl Kernel {
    /// Build a kernel from `size * size` row-major weights.
    pub fn new(size: usize, weights: Vec<f32>) -> Result<Self, FilterError> {
        if size == 0 || size % 2 == 0 {
            return Err(FilterError::InvalidConfiguration(format!(
                "kernel size must be odd and positive (got {size})"
            )));
        }
        if size > MAX_KERNEL_SIZE {
            return Err(FilterError::InvalidConfiguration(format!(
                "kernel size {size} exceeds the supported maximum of {MAX_KERNEL_SIZE}"
            )));
        }
        if weights.len() != size * size {
            return Err(FilterError::InvalidConfiguration(format!(
                "kernel of size {size} needs {} weights, got {}",
                size * size,
                weights.len()
            )));
        }
        if let Some(bad) = weights.iter().find(|w| !w.is_finite()) {
            return Err(FilterError::InvalidConfiguration(format!(
                "kernel weights must be finite (found {bad})"
            )));
        }
        Ok(Self { size, weights })
    }

    /// Uniform 3×3 box blur, every weight `1/9`.
    pub fn box_blur() -> Self {
        Self {
            size: 3,
            weights: vec![1.0 / 9.0; 9],
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn radius(&self) -> usize {
        self.size / 2
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Weight at kernel row `ky`, column `kx` (both in `0..size`).
    #[inline]
    pub fn weight(&self, ky: usize, kx: usize) -> f32 {
        self.weights[ky * self.size + kx]
    }

    pub fn total_weight(&self) -> f32 {
        self.weights.iter().sum()
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::box_blur()
    }
}

impl TryFrom<RawKernel> for Kernel {
    type Error = FilterError;

    fn try_from(raw: RawKernel) -> Result<Self, Self::Error> {
        Kernel::new(raw.size, raw.weights)
    }
}

impl From<Kernel> for RawKernel {
    fn from(k: Kernel) -> Self {
        RawKernel {
            size: k.size,
            weights: k.weights,
        }
    }
}

/// Named 3×3 kernels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelPreset {
    #[default]
    BoxBlur,
    Sharpen,
    EdgeDetect,
    Identity,
}

impl KernelPreset {
    pub fn kernel(self) -> Kernel {
        let weights = match self {
            KernelPreset::BoxBlur => return Kernel::box_blur(),
            KernelPreset::Sharpen => vec![0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0],
            KernelPreset::EdgeDetect => {
                vec![-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0]
            }
            KernelPreset::Identity => vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
        };
        Kernel { size: 3, weights }
    }
}

/// How neighbourhood taps falling outside the image are sampled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Out-of-range taps contribute 0.
    #[default]
    ZeroPad,
    /// Out-of-range coordinates snap to the nearest valid row/column, per axis.
    Clamp,
    /// Out-of-range taps are skipped and the sum is rescaled by
    /// `total_weight / in_bounds_weight` (a mean over valid neighbours for a box blur).
    Renormalize,
}

impl BoundaryPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            BoundaryPolicy::ZeroPad => "zero_pad",
            BoundaryPolicy::Clamp => "clamp",
            BoundaryPolicy::Renormalize => "renormalize",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_shapes() {
        assert!(Kernel::new(0, vec![]).is_err());
        assert!(Kernel::new(2, vec![0.25; 4]).is_err());
        assert!(Kernel::new(9, vec![0.0; 81]).is_err());
        assert!(Kernel::new(3, vec![0.1; 8]).is_err());
        assert!(Kernel::new(3, vec![f32::NAN; 9]).is_err());
        let k = Kernel::new(5, vec![0.04; 25]).unwrap();
        assert_eq!(k.radius(), 2);
    }

    #[test]
    fn presets_are_three_by_three() {
        for preset in [
            KernelPreset::BoxBlur,
            KernelPreset::Sharpen,
            KernelPreset::EdgeDetect,
            KernelPreset::Identity,
        ] {
            let k = preset.kernel();
            assert_eq!(k.size(), 3);
            assert_eq!(k.radius(), 1);
        }
        assert!((KernelPreset::BoxBlur.kernel().total_weight() - 1.0).abs() < 1e-6);
        assert!((KernelPreset::Sharpen.kernel().total_weight() - 1.0).abs() < 1e-6);
        assert!(KernelPreset::EdgeDetect.kernel().total_weight().abs() < 1e-6);
        assert_eq!(KernelPreset::Identity.kernel().weight(1, 1), 1.0);
    }

    #[test]
    fn deserialization_validates() {
        let ok: Kernel = serde_json::from_str(r#"{"size":1,"weights":[2.0]}"#).unwrap();
        assert_eq!(ok.weights(), &[2.0]);
        let bad: Result<Kernel, _> = serde_json::from_str(r#"{"size":4,"weights":[]}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn boundary_policy_names() {
        let p: BoundaryPolicy = serde_json::from_str("\"renormalize\"").unwrap();
        assert_eq!(p, BoundaryPolicy::Renormalize);
        assert_eq!(BoundaryPolicy::default().as_str(), "zero_pad");
    }
}
