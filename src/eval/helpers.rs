//! Lightweight evaluation helpers.
//!
//! These helpers provide simple APIs for common use cases:
//! - Evaluate a single reconstruction against a reference
//! - Assert quality thresholds in tests
//!
//! # Example
//!
//! ```
//! use vst_eval::eval::helpers::{assert_quality, evaluate_single};
//! use vst_eval::metrics::MetricConfig;
//! use vst_eval::plane::linear_ramp;
//!
//! let reference = linear_ramp(64, 64, 1.0, 255.0).unwrap();
//! let result = evaluate_single(reference.as_ref(), reference.as_ref(), 255.0, &MetricConfig::fast()).unwrap();
//! assert_eq!(result.mse, Some(0.0));
//!
//! assert_quality(reference.as_ref(), reference.as_ref(), 255.0, Some(40.0), Some(1.0)).unwrap();
//! ```

use imgref::ImgRef;

use crate::error::{Error, Result};
use crate::metrics::{self, dssim, hvs, MetricConfig, MetricResult};
use crate::plane;

/// Evaluate a single reconstruction against a reference.
///
/// MSE is computed once and reused for PSNR; both HVS variants come from a
/// single block pass.
///
/// # Errors
///
/// Returns an error if:
/// - Planes have different dimensions
/// - A plane is empty or contains non-finite samples
/// - A requested metric cannot be computed (e.g. no full 8×8 block for
///   PSNR-HVS-M)
pub fn evaluate_single(
    reference: ImgRef<'_, f64>,
    test: ImgRef<'_, f64>,
    peak: f64,
    config: &MetricConfig,
) -> Result<MetricResult> {
    plane::ensure_same_shape(reference, test)?;

    let mut result = MetricResult::default();

    if config.mse || config.psnr {
        let mse = metrics::mse(reference, test)?;
        if config.mse {
            result.mse = Some(mse);
        }
        if config.psnr {
            result.psnr = Some(metrics::psnr_from_mse(mse, peak)?);
        }
    }

    if config.psnr_hvs || config.psnr_hvs_m {
        let scores = hvs::hvs_scores(reference, test, peak)?;
        if config.psnr_hvs {
            result.psnr_hvs = Some(scores.psnr_hvs);
        }
        if config.psnr_hvs_m {
            result.psnr_hvs_m = Some(scores.psnr_hvs_m);
        }
    }

    if config.dssim {
        result.dssim = Some(dssim::calculate_dssim(reference, test, peak)?);
    }

    Ok(result)
}

/// Assert that a reconstruction meets PSNR and MSE thresholds.
///
/// # Arguments
///
/// * `reference` - Reference plane
/// * `test` - Reconstructed plane
/// * `peak` - Maximum representable intensity
/// * `min_psnr` - Minimum acceptable PSNR in dB (optional)
/// * `max_mse` - Maximum acceptable MSE (optional)
///
/// # Errors
///
/// Returns [`Error::QualityBelowThreshold`] for the first violated threshold,
/// or any error from [`evaluate_single`].
pub fn assert_quality(
    reference: ImgRef<'_, f64>,
    test: ImgRef<'_, f64>,
    peak: f64,
    min_psnr: Option<f64>,
    max_mse: Option<f64>,
) -> Result<()> {
    let result = evaluate_single(reference, test, peak, &MetricConfig::fast())?;

    if let (Some(threshold), Some(value)) = (min_psnr, result.psnr) {
        if value < threshold {
            return Err(Error::QualityBelowThreshold {
                metric: "PSNR".to_string(),
                value,
                threshold,
            });
        }
    }

    if let (Some(threshold), Some(value)) = (max_mse, result.mse) {
        if value > threshold {
            return Err(Error::QualityBelowThreshold {
                metric: "MSE".to_string(),
                value,
                threshold,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::{linear_ramp, map, synthetic_scene};

    #[test]
    fn test_evaluate_single_identical() {
        let img = synthetic_scene(64, 64).unwrap();
        let result = evaluate_single(img.as_ref(), img.as_ref(), 255.0, &MetricConfig::all()).unwrap();

        assert_eq!(result.mse, Some(0.0));
        assert!(result.psnr.unwrap().is_infinite());
        assert!(result.psnr_hvs.unwrap().is_infinite());
        assert!(result.psnr_hvs_m.unwrap().is_infinite());
        assert!(result.dssim.unwrap() < 0.0001);
    }

    #[test]
    fn test_evaluate_single_respects_config() {
        let img = synthetic_scene(32, 32).unwrap();
        let result = evaluate_single(img.as_ref(), img.as_ref(), 255.0, &MetricConfig::fast()).unwrap();
        assert!(result.mse.is_some());
        assert!(result.psnr.is_some());
        assert!(result.psnr_hvs_m.is_none());
        assert!(result.dssim.is_none());
    }

    #[test]
    fn test_evaluate_single_dimension_mismatch() {
        let a = linear_ramp(64, 64, 1.0, 2.0).unwrap();
        let b = linear_ramp(32, 32, 1.0, 2.0).unwrap();
        let result = evaluate_single(a.as_ref(), b.as_ref(), 255.0, &MetricConfig::standard());
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_assert_quality_pass() {
        let img = synthetic_scene(64, 64).unwrap();
        assert!(assert_quality(img.as_ref(), img.as_ref(), 255.0, Some(90.0), Some(0.0)).is_ok());
    }

    #[test]
    fn test_assert_quality_fail_psnr() {
        let img = synthetic_scene(64, 64).unwrap();
        let shifted = map(img.as_ref(), |v| v + 10.0);
        let result = assert_quality(img.as_ref(), shifted.as_ref(), 255.0, Some(40.0), None);
        assert!(matches!(result, Err(Error::QualityBelowThreshold { .. })));
    }
}
