//! Noise-level estimation in the transformed (additive) domain.
//!
//! Two estimators are provided and the caller picks one explicitly:
//!
//! - [`MadEstimator`]: blind estimate from a high-frequency detail band,
//!   for real acquisitions without ground truth.
//! - [`ReferenceEstimator`]: exact spread of `y_noisy - y_clean` when the
//!   clean image is known (synthetic experiments).

use imgref::ImgRef;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::plane::{self, Plane};
use crate::stats::{self, Summary};

/// Gaussian consistency constant `1 / Φ⁻¹(0.75)`.
pub const MAD_TO_SIGMA: f64 = 1.482_602_218_505_602;

/// Estimates the additive noise standard deviation of a transformed image.
pub trait SigmaEstimator {
    /// Estimate σ of the noise in `transformed`.
    fn estimate(&self, transformed: ImgRef<'_, f64>) -> Result<f64>;
}

/// High-pass band the blind estimator measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DetailBand {
    /// Diagonal (HH) sub-band of a one-level orthonormal Haar transform.
    #[default]
    Haar,
    /// 5-point Laplacian with symmetric boundaries, scaled by `1/√20`.
    Laplacian,
}

/// Blind MAD estimator: `σ̂ = 1.4826 · MAD(detail band) · gain`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MadEstimator {
    /// Detail band to measure.
    pub band: DetailBand,
    /// Extra calibration multiplier applied to the estimate.
    pub gain: f64,
}

impl Default for MadEstimator {
    fn default() -> Self {
        Self {
            band: DetailBand::Haar,
            gain: 1.0,
        }
    }
}

impl MadEstimator {
    /// Estimator over the given band with unit gain.
    #[must_use]
    pub fn new(band: DetailBand) -> Self {
        Self { band, gain: 1.0 }
    }

    /// Replace the calibration gain.
    #[must_use]
    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }
}

impl SigmaEstimator for MadEstimator {
    fn estimate(&self, transformed: ImgRef<'_, f64>) -> Result<f64> {
        plane::ensure_non_empty(transformed, "sigma estimation input")?;
        plane::ensure_finite(transformed, "sigma estimation input")?;
        if !(self.gain.is_finite() && self.gain > 0.0) {
            return Err(Error::invalid("gain", format!("must be finite and > 0, got {}", self.gain)));
        }

        let band = match self.band {
            DetailBand::Haar if transformed.width() >= 2 && transformed.height() >= 2 => {
                haar_diagonal(transformed)
            }
            _ => laplacian(transformed),
        };

        let sigma = MAD_TO_SIGMA * mad(&band)? * self.gain;
        debug!(band = ?self.band, coefficients = band.len(), sigma, "blind sigma estimate");
        Ok(sigma)
    }
}

/// Ground-truth estimator: population standard deviation of
/// `transformed - reference` (both in the transformed domain).
#[derive(Debug, Clone)]
pub struct ReferenceEstimator {
    reference: Plane,
}

impl ReferenceEstimator {
    /// Use `reference` (the transformed clean image) as ground truth.
    #[must_use]
    pub fn new(reference: Plane) -> Self {
        Self { reference }
    }
}

impl SigmaEstimator for ReferenceEstimator {
    fn estimate(&self, transformed: ImgRef<'_, f64>) -> Result<f64> {
        plane::ensure_same_shape(self.reference.as_ref(), transformed)?;
        plane::ensure_non_empty(transformed, "sigma estimation input")?;
        plane::ensure_finite(transformed, "sigma estimation input")?;

        let residual: Vec<f64> = transformed
            .pixels()
            .zip(self.reference.pixels())
            .map(|(noisy, clean)| noisy - clean)
            .collect();
        let summary = Summary::compute(&residual).ok_or(Error::EmptyInput("residual"))?;
        Ok(summary.std_dev)
    }
}

/// Median absolute deviation of `values` (unscaled).
pub fn mad(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(Error::EmptyInput("detail coefficients"));
    }
    Ok(stats::median_absolute_deviation(values))
}

/// One-level Haar HH coefficients `(a - b - c + d) / 2` over 2×2 blocks.
///
/// Orthonormal, so i.i.d. noise keeps its variance.
fn haar_diagonal(img: ImgRef<'_, f64>) -> Vec<f64> {
    let (w, h) = plane::dims(img);
    let data = plane::to_vec(img);
    let mut out = Vec::with_capacity((w / 2) * (h / 2));
    for by in 0..h / 2 {
        let top = 2 * by * w;
        let bottom = top + w;
        for bx in 0..w / 2 {
            let x = 2 * bx;
            let a = data[top + x];
            let b = data[top + x + 1];
            let c = data[bottom + x];
            let d = data[bottom + x + 1];
            out.push((a - b - c + d) / 2.0);
        }
    }
    out
}

/// 5-point Laplacian response with half-sample symmetric boundaries.
///
/// Scaled by `1/√20` so i.i.d. noise of variance σ² yields variance σ².
fn laplacian(img: ImgRef<'_, f64>) -> Vec<f64> {
    let (w, h) = plane::dims(img);
    let data = plane::to_vec(img);
    let norm = 20f64.sqrt();
    let at = |x: isize, y: isize| {
        let x = x.clamp(0, w as isize - 1) as usize;
        let y = y.clamp(0, h as isize - 1) as usize;
        data[y * w + x]
    };

    let mut out = Vec::with_capacity(w * h);
    for y in 0..h as isize {
        for x in 0..w as isize {
            let response =
                4.0 * at(x, y) - at(x - 1, y) - at(x + 1, y) - at(x, y - 1) - at(x, y + 1);
            out.push(response / norm);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::linear_ramp;
    use imgref::ImgVec;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn gaussian_plane(width: usize, height: usize, sigma: f64, seed: u64) -> Plane {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, sigma).unwrap();
        let pixels = (0..width * height).map(|_| normal.sample(&mut rng)).collect();
        ImgVec::new(pixels, width, height)
    }

    #[test]
    fn test_haar_recovers_gaussian_sigma() {
        let noise = gaussian_plane(256, 256, 5.0, 11);
        let sigma = MadEstimator::default().estimate(noise.as_ref()).unwrap();
        assert!((sigma - 5.0).abs() / 5.0 < 0.1, "sigma {sigma}");
    }

    #[test]
    fn test_laplacian_recovers_gaussian_sigma() {
        let noise = gaussian_plane(256, 256, 5.0, 12);
        let sigma = MadEstimator::new(DetailBand::Laplacian)
            .estimate(noise.as_ref())
            .unwrap();
        assert!((sigma - 5.0).abs() / 5.0 < 0.1, "sigma {sigma}");
    }

    #[test]
    fn test_haar_ignores_smooth_signal() {
        let ramp = linear_ramp(256, 256, 0.0, 500.0).unwrap();
        let noise = gaussian_plane(256, 256, 2.0, 13);
        let pixels: Vec<f64> = ramp.pixels().zip(noise.pixels()).map(|(s, n)| s + n).collect();
        let noisy = ImgVec::new(pixels, 256, 256);

        let sigma = MadEstimator::default().estimate(noisy.as_ref()).unwrap();
        assert!((sigma - 2.0).abs() / 2.0 < 0.1, "sigma {sigma}");
    }

    #[test]
    fn test_gain_scales_estimate() {
        let noise = gaussian_plane(64, 64, 1.0, 14);
        let base = MadEstimator::default().estimate(noise.as_ref()).unwrap();
        let scaled = MadEstimator::default()
            .with_gain(4.5)
            .estimate(noise.as_ref())
            .unwrap();
        assert!((scaled - 4.5 * base).abs() < 1e-12);
    }

    #[test]
    fn test_constant_image_is_zero_not_nan() {
        let flat = ImgVec::new(vec![3.0; 64], 8, 8);
        for band in [DetailBand::Haar, DetailBand::Laplacian] {
            let sigma = MadEstimator::new(band).estimate(flat.as_ref()).unwrap();
            assert_eq!(sigma, 0.0);
        }
        let single = ImgVec::new(vec![2.0], 1, 1);
        assert_eq!(MadEstimator::default().estimate(single.as_ref()).unwrap(), 0.0);
    }

    #[test]
    fn test_empty_input() {
        let empty: Plane = ImgVec::new(Vec::new(), 4, 0);
        assert!(matches!(
            MadEstimator::default().estimate(empty.as_ref()),
            Err(Error::EmptyInput(_))
        ));
        assert!(matches!(mad(&[]), Err(Error::EmptyInput(_))));
    }

    #[test]
    fn test_non_finite_input() {
        let bad = ImgVec::new(vec![1.0, f64::INFINITY, 2.0, 3.0], 2, 2);
        assert!(matches!(
            MadEstimator::default().estimate(bad.as_ref()),
            Err(Error::NonFiniteInput(_))
        ));
    }

    #[test]
    fn test_reference_estimator() {
        let clean = linear_ramp(128, 128, 10.0, 50.0).unwrap();
        let noise = gaussian_plane(128, 128, 0.8, 15);
        let pixels: Vec<f64> = clean.pixels().zip(noise.pixels()).map(|(s, n)| s + n).collect();
        let noisy = ImgVec::new(pixels, 128, 128);

        let sigma = ReferenceEstimator::new(clean).estimate(noisy.as_ref()).unwrap();
        assert!((sigma - 0.8).abs() < 0.02, "sigma {sigma}");
    }

    #[test]
    fn test_reference_estimator_shape_mismatch() {
        let clean = linear_ramp(8, 8, 1.0, 2.0).unwrap();
        let other = linear_ramp(8, 4, 1.0, 2.0).unwrap();
        assert!(matches!(
            ReferenceEstimator::new(clean).estimate(other.as_ref()),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
