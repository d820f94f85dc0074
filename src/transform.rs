//! Parametric logarithmic variance-stabilizing transform.
//!
//! The forward map `y = a · log_b(I)` turns multiplicative (speckle) noise
//! into additive noise of constant variance; the inverse is `I = b^(y / a)`.
//! A multiplicative noise level `σ_mult` maps to the additive level
//! `σ_add = a · σ_mult / ln(b)` in the transformed domain.

use imgref::ImgRef;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Result};
use crate::plane::{self, Plane};

/// Transform parameters `(a, b)`: positive scale and log base greater than one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VstParams {
    /// Output scale.
    pub a: f64,
    /// Logarithm base.
    pub b: f64,
}

impl Default for VstParams {
    fn default() -> Self {
        Self { a: 8.39, b: 1.2 }
    }
}

impl VstParams {
    /// Create validated parameters.
    pub fn new(a: f64, b: f64) -> Result<Self> {
        let params = Self { a, b };
        params.validate()?;
        Ok(params)
    }

    /// Check `a > 0` and `b > 1` (both finite).
    pub fn validate(&self) -> Result<()> {
        if !(self.a.is_finite() && self.a > 0.0) {
            return Err(Error::invalid("a", format!("scale must be finite and > 0, got {}", self.a)));
        }
        if !(self.b.is_finite() && self.b > 1.0) {
            return Err(Error::invalid("b", format!("log base must be finite and > 1, got {}", self.b)));
        }
        Ok(())
    }

    /// `a / ln(b)`, the slope of the forward map with respect to `ln(I)`.
    #[inline]
    fn gain(&self) -> f64 {
        self.a / self.b.ln()
    }
}

/// Forward transform `y = a · ln(I) / ln(b)`.
///
/// Every sample must be finite and strictly positive; use
/// [`forward_floored`] to clamp raw data first.
pub fn forward(image: ImgRef<'_, f64>, params: VstParams) -> Result<Plane> {
    params.validate()?;
    if image.pixels().any(|v| !(v.is_finite() && v > 0.0)) {
        return Err(Error::invalid(
            "image",
            "forward transform requires finite samples > 0 (clamp to a positive floor first)",
        ));
    }
    trace!(width = image.width(), height = image.height(), a = params.a, b = params.b, "vst forward");
    let gain = params.gain();
    Ok(plane::map(image, |v| gain * v.ln()))
}

/// Clamp `image` to `max(I, floor)` and apply [`forward`].
pub fn forward_floored(image: ImgRef<'_, f64>, params: VstParams, floor: f64) -> Result<Plane> {
    let floored = plane::floor_positive(image, floor)?;
    forward(floored.as_ref(), params)
}

/// Inverse transform `I = b^(y / a)`.
pub fn inverse(transformed: ImgRef<'_, f64>, params: VstParams) -> Result<Plane> {
    params.validate()?;
    trace!(
        width = transformed.width(),
        height = transformed.height(),
        a = params.a,
        b = params.b,
        "vst inverse"
    );
    let a = params.a;
    let b = params.b;
    Ok(plane::map(transformed, |y| b.powf(y / a)))
}

/// Additive-domain noise level equivalent to a multiplicative level.
///
/// `σ_add = a · σ_mult / ln(b)`.
pub fn sigma_to_additive(sigma_mult: f64, params: VstParams) -> Result<f64> {
    params.validate()?;
    Ok(params.gain() * sigma_mult)
}

/// Multiplicative noise level equivalent to an additive-domain level.
///
/// Inverse of [`sigma_to_additive`]: `σ_mult = σ_add · ln(b) / a`.
pub fn additive_to_multiplicative(sigma_add: f64, params: VstParams) -> Result<f64> {
    params.validate()?;
    Ok(sigma_add / params.gain())
}

/// Mean squared error of `inverse(forward(I))` against `I`.
pub fn roundtrip_mse(image: ImgRef<'_, f64>, params: VstParams) -> Result<f64> {
    let restored = inverse(forward(image, params)?.as_ref(), params)?;
    crate::metrics::mse(image, restored.as_ref())
}
