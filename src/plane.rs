//! Single-channel intensity planes.
//!
//! Every image in the pipeline is an [`imgref::ImgVec<f64>`]. Operations take
//! [`ImgRef`] views and return freshly allocated planes, so a stage never
//! holds a mutable alias into another stage's output.

use imgref::{ImgRef, ImgVec};

use crate::error::{Error, Result};

/// Owned intensity plane (row-major, one sample per pixel).
pub type Plane = ImgVec<f64>;

/// (width, height) of a plane view.
#[inline]
pub fn dims(img: ImgRef<'_, f64>) -> (usize, usize) {
    (img.width(), img.height())
}

/// Fail with [`Error::ShapeMismatch`] unless both views have equal dimensions.
pub fn ensure_same_shape(expected: ImgRef<'_, f64>, actual: ImgRef<'_, f64>) -> Result<()> {
    if dims(expected) != dims(actual) {
        return Err(Error::ShapeMismatch {
            expected: dims(expected),
            actual: dims(actual),
        });
    }
    Ok(())
}

/// Fail with [`Error::EmptyInput`] on a zero-area plane.
pub fn ensure_non_empty(img: ImgRef<'_, f64>, what: &'static str) -> Result<()> {
    if img.width() == 0 || img.height() == 0 {
        return Err(Error::EmptyInput(what));
    }
    Ok(())
}

/// Fail with [`Error::EmptyInput`] unless a `width × height` plane has samples.
///
/// `ImgVec` cannot represent a zero-width buffer, so generators check first.
pub fn ensure_dims(width: usize, height: usize, what: &'static str) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::EmptyInput(what));
    }
    Ok(())
}

/// Fail with [`Error::NonFiniteInput`] if any sample is NaN or infinite.
pub fn ensure_finite(img: ImgRef<'_, f64>, what: &'static str) -> Result<()> {
    if img.pixels().any(|v| !v.is_finite()) {
        return Err(Error::NonFiniteInput(what));
    }
    Ok(())
}

/// Apply `f` to every sample, producing a new contiguous plane.
pub fn map(img: ImgRef<'_, f64>, f: impl Fn(f64) -> f64) -> Plane {
    let pixels: Vec<f64> = img.pixels().map(f).collect();
    ImgVec::new(pixels, img.width(), img.height())
}

/// Copy a view into a contiguous row-major buffer (stride == width).
pub fn to_vec(img: ImgRef<'_, f64>) -> Vec<f64> {
    img.pixels().collect()
}

/// Clamp every sample to at least `floor` so that `ln` is defined.
///
/// NaN samples are rejected rather than clamped.
pub fn floor_positive(img: ImgRef<'_, f64>, floor: f64) -> Result<Plane> {
    if !(floor.is_finite() && floor > 0.0) {
        return Err(Error::invalid("floor", format!("must be finite and > 0, got {floor}")));
    }
    if img.pixels().any(f64::is_nan) {
        return Err(Error::NonFiniteInput("intensity image"));
    }
    Ok(map(img, |v| v.max(floor)))
}

/// Uncompressed size of a plane stored with `bytes_per_sample` bytes per pixel.
#[inline]
pub fn raw_size_bytes(img: ImgRef<'_, f64>, bytes_per_sample: usize) -> usize {
    img.width() * img.height() * bytes_per_sample
}

/// Smallest and largest sample, or `None` for an empty plane.
pub fn min_max(img: ImgRef<'_, f64>) -> Option<(f64, f64)> {
    img.pixels().fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Horizontal linear ramp from `low` (left column) to `high` (right column).
pub fn linear_ramp(width: usize, height: usize, low: f64, high: f64) -> Result<Plane> {
    ensure_dims(width, height, "linear ramp")?;
    let denom = width.saturating_sub(1).max(1) as f64;
    let row: Vec<f64> = (0..width)
        .map(|x| low + (high - low) * x as f64 / denom)
        .collect();
    let pixels: Vec<f64> = (0..height).flat_map(|_| row.iter().copied()).collect();
    Ok(ImgVec::new(pixels, width, height))
}

/// Clean synthetic test scene.
///
/// A diagonal gradient `100·(x + y) + 50` over the unit square, a bright disc
/// (+150) centred at (0.6, 0.6) and a near-black square (intensity 1.0)
/// centred at (0.3, 0.3), standing in for a water or shadow region.
pub fn synthetic_scene(width: usize, height: usize) -> Result<Plane> {
    ensure_dims(width, height, "synthetic scene")?;
    let step = |n: usize, i: usize| {
        if n > 1 {
            i as f64 / (n - 1) as f64
        } else {
            0.0
        }
    };

    let mut pixels = Vec::with_capacity(width * height);
    for row in 0..height {
        let y = step(height, row);
        for col in 0..width {
            let x = step(width, col);
            let mut v = 100.0 * (x + y) + 50.0;
            if (x - 0.6).powi(2) + (y - 0.6).powi(2) < 0.05 {
                v += 150.0;
            }
            if (x - 0.3).abs() < 0.1 && (y - 0.3).abs() < 0.1 {
                v = 1.0;
            }
            pixels.push(v);
        }
    }
    Ok(ImgVec::new(pixels, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch() {
        let a = linear_ramp(4, 4, 1.0, 2.0).unwrap();
        let b = linear_ramp(4, 3, 1.0, 2.0).unwrap();
        let err = ensure_same_shape(a.as_ref(), b.as_ref()).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch {
                expected: (4, 4),
                actual: (4, 3)
            }
        ));
    }

    #[test]
    fn test_floor_positive() {
        let img = ImgVec::new(vec![0.0, -3.0, 0.5, 7.0], 2, 2);
        let floored = floor_positive(img.as_ref(), 1.0).unwrap();
        assert_eq!(floored.buf(), &[1.0, 1.0, 1.0, 7.0]);
        assert!(floor_positive(img.as_ref(), 0.0).is_err());
    }

    #[test]
    fn test_floor_rejects_nan() {
        let img = ImgVec::new(vec![1.0, f64::NAN], 2, 1);
        assert!(matches!(
            floor_positive(img.as_ref(), 1.0),
            Err(Error::NonFiniteInput(_))
        ));
    }

    #[test]
    fn test_linear_ramp_endpoints() {
        let ramp = linear_ramp(64, 64, 1.0, 255.0).unwrap();
        let (lo, hi) = min_max(ramp.as_ref()).unwrap();
        assert_eq!(lo, 1.0);
        assert_eq!(hi, 255.0);
        assert_eq!(ramp.width(), 64);
        assert_eq!(ramp.height(), 64);
    }

    #[test]
    fn test_synthetic_scene_features() {
        let scene = synthetic_scene(101, 101).unwrap();
        let px = |x: usize, y: usize| scene.buf()[y * 101 + x];
        // Dark square centre
        assert_eq!(px(30, 30), 1.0);
        // Disc centre: 100 * 1.2 + 50 + 150
        assert!((px(60, 60) - 320.0).abs() < 1e-9);
        // Gradient corner
        assert!((px(0, 0) - 50.0).abs() < 1e-9);
        assert!(scene.pixels().all(|v| v > 0.0));
    }

    #[test]
    fn test_generators_reject_zero_dimensions() {
        assert!(matches!(synthetic_scene(0, 0), Err(Error::EmptyInput(_))));
        assert!(matches!(synthetic_scene(8, 0), Err(Error::EmptyInput(_))));
        assert!(matches!(linear_ramp(0, 5, 1.0, 2.0), Err(Error::EmptyInput(_))));
        assert!(ensure_dims(1, 1, "pixel").is_ok());
    }

    #[test]
    fn test_raw_size() {
        let img = linear_ramp(10, 20, 1.0, 2.0).unwrap();
        assert_eq!(raw_size_bytes(img.as_ref(), 1), 200);
        assert_eq!(raw_size_bytes(img.as_ref(), 2), 400);
    }
}
