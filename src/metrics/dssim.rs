//! DSSIM (Structural Dissimilarity) metric calculation.
//!
//! Wraps the `dssim-core` crate. Intensity planes are normalized by their peak
//! and replicated into grey RGBA before comparison.

use dssim_core::Dssim;
use imgref::{ImgRef, ImgVec};
use rgb::RGBA;

use crate::error::{Error, Result};
use crate::metrics::validate_peak;
use crate::plane;

/// Calculate DSSIM between two intensity planes.
///
/// # Arguments
///
/// * `reference` - Reference plane.
/// * `test` - Reconstructed plane.
/// * `peak` - Maximum representable intensity; samples are divided by it and
///   clamped to `[0, 1]`.
///
/// # Returns
///
/// DSSIM value where 0 = identical, higher = more different.
///
/// # Errors
///
/// Returns an error if the planes have different dimensions, are empty, or if
/// `dssim-core` cannot build an image from them.
pub fn calculate_dssim(reference: ImgRef<'_, f64>, test: ImgRef<'_, f64>, peak: f64) -> Result<f64> {
    plane::ensure_same_shape(reference, test)?;
    plane::ensure_non_empty(reference, "DSSIM input")?;
    validate_peak(peak)?;

    let dssim = Dssim::new();

    let ref_image = dssim
        .create_image(&to_dssim_image(reference, peak))
        .ok_or_else(|| Error::MetricCalculation {
            metric: "DSSIM".to_string(),
            reason: "Failed to create reference image".to_string(),
        })?;

    let test_image = dssim
        .create_image(&to_dssim_image(test, peak))
        .ok_or_else(|| Error::MetricCalculation {
            metric: "DSSIM".to_string(),
            reason: "Failed to create test image".to_string(),
        })?;

    let (dssim_val, _ssim_maps) = dssim.compare(&ref_image, test_image);

    Ok(f64::from(dssim_val))
}

/// Grey RGBA image with samples `clamp(v / peak, 0, 1)`.
#[must_use]
pub fn to_dssim_image(img: ImgRef<'_, f64>, peak: f64) -> ImgVec<RGBA<f32>> {
    let pixels: Vec<RGBA<f32>> = img
        .pixels()
        .map(|v| {
            let g = (v / peak).clamp(0.0, 1.0) as f32;
            RGBA { r: g, g, b: g, a: 1.0 }
        })
        .collect();

    ImgVec::new(pixels, img.width(), img.height())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::linear_ramp;

    #[test]
    fn test_identical_planes() {
        let img = linear_ramp(100, 100, 10.0, 240.0).unwrap();
        let dssim = calculate_dssim(img.as_ref(), img.as_ref(), 255.0).unwrap();
        assert!(dssim < 0.0001, "Identical planes should have near-zero DSSIM");
    }

    #[test]
    fn test_different_planes() {
        let a = ImgVec::new(vec![0.3 * 255.0; 100 * 100], 100, 100);
        let b = ImgVec::new(vec![0.7 * 255.0; 100 * 100], 100, 100);
        let dssim = calculate_dssim(a.as_ref(), b.as_ref(), 255.0).unwrap();
        assert!(dssim > 0.0, "Different planes should have non-zero DSSIM");
    }

    #[test]
    fn test_dimension_mismatch() {
        let small = linear_ramp(50, 50, 0.0, 1.0).unwrap();
        let large = linear_ramp(100, 100, 0.0, 1.0).unwrap();
        let result = calculate_dssim(small.as_ref(), large.as_ref(), 1.0);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_conversion_clamps_to_unit_range() {
        let img = ImgVec::new(vec![-5.0, 128.0, 300.0], 3, 1);
        let converted = to_dssim_image(img.as_ref(), 256.0);
        let pixels: Vec<_> = converted.pixels().collect();
        assert_eq!(pixels[0].r, 0.0);
        assert!((pixels[1].g - 0.5).abs() < 1e-6);
        assert_eq!(pixels[2].b, 1.0);
        assert_eq!(pixels[2].a, 1.0);
    }
}
