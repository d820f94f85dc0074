//! Signed relative error map for visual inspection.
//!
//! `E = clamp(128 + 128·(I_comp − I_true)/I_true, 0, 255)`: 128 means exact,
//! 0 means the reconstruction is at or below zero relative to the truth, 255
//! means it is at least twice the truth.
//!
//! Where `I_true == 0` the ratio is undefined. The map then takes the clamped
//! extreme matching the sign of `I_comp` (255 above, 0 below) and 128 when
//! both are zero. An infinite `I_true` saturates the same way on the sign of
//! `I_comp − I_true`, so only two equal infinities map to 128.

use std::cmp::Ordering;

use imgref::{ImgRef, ImgVec};

use crate::error::{Error, Result};
use crate::plane::{self, Plane};

/// Neutral value for an exact reconstruction.
pub const CENTER: f64 = 128.0;

/// Relative error map of `comp` against `truth`, values in `[0, 255]`.
///
/// # Errors
///
/// Shape mismatch, empty input, or a NaN sample in either plane.
pub fn error_map(truth: ImgRef<'_, f64>, comp: ImgRef<'_, f64>) -> Result<Plane> {
    plane::ensure_same_shape(truth, comp)?;
    plane::ensure_non_empty(truth, "error map input")?;
    if truth.pixels().any(f64::is_nan) {
        return Err(Error::NonFiniteInput("error map reference"));
    }
    if comp.pixels().any(f64::is_nan) {
        return Err(Error::NonFiniteInput("error map reconstruction"));
    }

    let pixels: Vec<f64> = truth.pixels().zip(comp.pixels()).map(|(t, c)| relative(t, c)).collect();
    Ok(ImgVec::new(pixels, truth.width(), truth.height()))
}

/// [`error_map`] rounded to 8-bit samples for display.
pub fn error_map_u8(truth: ImgRef<'_, f64>, comp: ImgRef<'_, f64>) -> Result<ImgVec<u8>> {
    let map = error_map(truth, comp)?;
    let pixels: Vec<u8> = map.pixels().map(|v| v.round() as u8).collect();
    Ok(ImgVec::new(pixels, map.width(), map.height()))
}

fn relative(truth: f64, comp: f64) -> f64 {
    if truth == 0.0 {
        return saturate(comp);
    }
    let value = CENTER + CENTER * (comp - truth) / truth;
    if value.is_nan() {
        // infinite truth: only the direction of the error is defined
        saturate(comp - truth)
    } else {
        value.clamp(0.0, 255.0)
    }
}

/// Full scale in the direction of `delta`, or the center when it has none.
fn saturate(delta: f64) -> f64 {
    match delta.partial_cmp(&0.0) {
        Some(Ordering::Greater) => 255.0,
        Some(Ordering::Less) => 0.0,
        _ => CENTER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::synthetic_scene;

    #[test]
    fn test_identical_is_center() {
        let img = synthetic_scene(32, 32).unwrap();
        let map = error_map(img.as_ref(), img.as_ref()).unwrap();
        assert!(map.pixels().all(|v| v == CENTER));
        let map = error_map_u8(img.as_ref(), img.as_ref()).unwrap();
        assert!(map.pixels().all(|v| v == 128));
    }

    #[test]
    fn test_values_and_clamping() {
        let truth = ImgVec::new(vec![100.0, 100.0, 100.0, 100.0, 10.0], 5, 1);
        let comp = ImgVec::new(vec![150.0, 50.0, 300.0, -20.0, 10.5], 5, 1);
        let map = error_map(truth.as_ref(), comp.as_ref()).unwrap();
        assert_eq!(&map.buf()[..4], &[192.0, 64.0, 255.0, 0.0]);
        assert!((map.buf()[4] - 134.4).abs() < 1e-9);
    }

    #[test]
    fn test_zero_truth_policy() {
        let truth = ImgVec::new(vec![0.0, 0.0, 0.0], 3, 1);
        let comp = ImgVec::new(vec![5.0, -5.0, 0.0], 3, 1);
        let map = error_map(truth.as_ref(), comp.as_ref()).unwrap();
        assert_eq!(map.buf(), &[255.0, 0.0, 128.0]);
    }

    #[test]
    fn test_infinite_truth_saturates_toward_the_error() {
        let truth = ImgVec::new(
            vec![f64::INFINITY, f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY],
            5,
            1,
        );
        let comp = ImgVec::new(vec![5.0, f64::NEG_INFINITY, f64::INFINITY, 5.0, f64::NEG_INFINITY], 5, 1);
        let map = error_map(truth.as_ref(), comp.as_ref()).unwrap();
        assert_eq!(map.buf(), &[0.0, 0.0, 128.0, 255.0, 128.0]);
    }

    #[test]
    fn test_output_always_in_range() {
        let truth = ImgVec::new(vec![1e-9, -3.0, 7.0, 1e300, f64::INFINITY, 2.0], 3, 2);
        let comp = ImgVec::new(vec![1e9, 4.0, -1e300, 1e-300, f64::INFINITY, f64::NEG_INFINITY], 3, 2);
        let map = error_map(truth.as_ref(), comp.as_ref()).unwrap();
        assert!(map.pixels().all(|v| (0.0..=255.0).contains(&v)));
    }

    #[test]
    fn test_rejects_nan_and_mismatch() {
        let a = ImgVec::new(vec![1.0, f64::NAN], 2, 1);
        let b = ImgVec::new(vec![1.0, 1.0], 2, 1);
        assert!(matches!(
            error_map(a.as_ref(), b.as_ref()),
            Err(Error::NonFiniteInput(_))
        ));
        let c = ImgVec::new(vec![1.0], 1, 1);
        assert!(matches!(
            error_map(b.as_ref(), c.as_ref()),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
