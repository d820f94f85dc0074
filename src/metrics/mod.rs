//! Distortion metrics between a reference and a reconstructed plane.
//!
//! Supported metrics:
//!
//! - **MSE**: mean squared error (lower is better, 0 = identical)
//! - **PSNR**: peak signal-to-noise ratio in dB (higher is better)
//! - **PSNR-HVS / PSNR-HVS-M**: CSF-weighted and masking-aware PSNR over 8×8
//!   DCT blocks (see [`hvs`] for the pinned coefficient tables)
//! - **DSSIM**: structural dissimilarity (lower is better, 0 = identical)
//!
//! PSNR values are `+inf` for identical inputs. That sentinel is deliberate and
//! is the only non-error result for a degenerate comparison.

pub mod dssim;
pub mod hvs;

use std::fmt;
use std::str::FromStr;

use imgref::ImgRef;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::plane;

/// Configuration for which metrics to calculate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricConfig {
    /// Calculate MSE.
    pub mse: bool,
    /// Calculate PSNR.
    pub psnr: bool,
    /// Calculate PSNR-HVS (CSF weighting only).
    pub psnr_hvs: bool,
    /// Calculate PSNR-HVS-M (CSF weighting and contrast masking).
    pub psnr_hvs_m: bool,
    /// Calculate DSSIM.
    pub dssim: bool,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl MetricConfig {
    /// MSE, PSNR and both HVS variants (everything except DSSIM).
    #[must_use]
    pub fn standard() -> Self {
        Self {
            mse: true,
            psnr: true,
            psnr_hvs: true,
            psnr_hvs_m: true,
            dssim: false,
        }
    }

    /// Calculate all available metrics.
    #[must_use]
    pub fn all() -> Self {
        Self {
            dssim: true,
            ..Self::standard()
        }
    }

    /// Fast metric set (MSE and PSNR only).
    #[must_use]
    pub fn fast() -> Self {
        Self {
            mse: true,
            psnr: true,
            psnr_hvs: false,
            psnr_hvs_m: false,
            dssim: false,
        }
    }

    /// Perceptual metrics only.
    #[must_use]
    pub fn perceptual() -> Self {
        Self {
            mse: false,
            psnr: false,
            psnr_hvs: true,
            psnr_hvs_m: true,
            dssim: true,
        }
    }

    /// Make sure `target` is among the calculated metrics.
    #[must_use]
    pub fn with_target(mut self, target: TargetMetric) -> Self {
        match target {
            TargetMetric::Mse => self.mse = true,
            TargetMetric::Psnr => self.psnr = true,
            TargetMetric::PsnrHvs => self.psnr_hvs = true,
            TargetMetric::PsnrHvsM => self.psnr_hvs_m = true,
            TargetMetric::Dssim => self.dssim = true,
        }
        self
    }
}

/// Results from metric calculations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    /// Mean squared error.
    pub mse: Option<f64>,
    /// PSNR in dB.
    pub psnr: Option<f64>,
    /// PSNR-HVS in dB.
    pub psnr_hvs: Option<f64>,
    /// PSNR-HVS-M in dB.
    pub psnr_hvs_m: Option<f64>,
    /// DSSIM value.
    pub dssim: Option<f64>,
}

impl MetricResult {
    /// Raw value of `metric`, if it was calculated.
    #[must_use]
    pub fn get(&self, metric: TargetMetric) -> Option<f64> {
        match metric {
            TargetMetric::Mse => self.mse,
            TargetMetric::Psnr => self.psnr,
            TargetMetric::PsnrHvs => self.psnr_hvs,
            TargetMetric::PsnrHvsM => self.psnr_hvs_m,
            TargetMetric::Dssim => self.dssim,
        }
    }
}

/// Metric an optimal operating point is selected by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMetric {
    /// Mean squared error (minimized).
    Mse,
    /// PSNR (maximized).
    #[default]
    Psnr,
    /// PSNR-HVS (maximized).
    PsnrHvs,
    /// PSNR-HVS-M (maximized).
    PsnrHvsM,
    /// DSSIM (minimized).
    Dssim,
}

impl TargetMetric {
    /// Whether larger raw values mean better quality.
    #[must_use]
    pub fn higher_is_better(self) -> bool {
        !matches!(self, Self::Mse | Self::Dssim)
    }

    /// Value oriented so that larger is always better.
    #[must_use]
    pub fn score(self, value: f64) -> f64 {
        if self.higher_is_better() { value } else { -value }
    }

    /// Short column label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Mse => "MSE",
            Self::Psnr => "PSNR",
            Self::PsnrHvs => "PSNR-HVS",
            Self::PsnrHvsM => "PSNR-HVS-M",
            Self::Dssim => "DSSIM",
        }
    }
}

impl fmt::Display for TargetMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TargetMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "mse" => Ok(Self::Mse),
            "psnr" => Ok(Self::Psnr),
            "psnrhvs" | "hvs" => Ok(Self::PsnrHvs),
            "psnrhvsm" | "hvsm" => Ok(Self::PsnrHvsM),
            "dssim" => Ok(Self::Dssim),
            _ => Err(Error::invalid(
                "metric",
                format!("unknown metric '{s}' (expected mse, psnr, psnr-hvs, psnr-hvs-m, dssim)"),
            )),
        }
    }
}

/// Mean of squared per-pixel differences.
pub fn mse(reference: ImgRef<'_, f64>, test: ImgRef<'_, f64>) -> Result<f64> {
    plane::ensure_same_shape(reference, test)?;
    plane::ensure_non_empty(reference, "MSE input")?;
    plane::ensure_finite(reference, "MSE reference")?;
    plane::ensure_finite(test, "MSE test image")?;

    let count = (reference.width() * reference.height()) as f64;
    let sum: f64 = reference
        .pixels()
        .zip(test.pixels())
        .map(|(r, t)| (r - t) * (r - t))
        .sum();
    Ok(sum / count)
}

/// PSNR in dB from a precomputed MSE.
///
/// Evaluated as `20·log10(peak) − 10·log10(mse)` so that large peaks cannot
/// overflow `peak²`. Returns `f64::INFINITY` when `mse == 0`.
pub fn psnr_from_mse(mse: f64, peak: f64) -> Result<f64> {
    validate_peak(peak)?;
    if !(mse.is_finite() && mse >= 0.0) {
        return Err(Error::invalid("mse", format!("must be finite and >= 0, got {mse}")));
    }
    if mse == 0.0 {
        return Ok(f64::INFINITY);
    }
    Ok(20.0 * peak.log10() - 10.0 * mse.log10())
}

/// Calculate PSNR between two planes.
///
/// # Returns
///
/// PSNR value in decibels. Higher is better. Returns `f64::INFINITY` if
/// the planes are identical.
pub fn psnr(reference: ImgRef<'_, f64>, test: ImgRef<'_, f64>, peak: f64) -> Result<f64> {
    validate_peak(peak)?;
    psnr_from_mse(mse(reference, test)?, peak)
}

pub(crate) fn validate_peak(peak: f64) -> Result<()> {
    if !(peak.is_finite() && peak > 0.0) {
        return Err(Error::invalid("peak", format!("must be finite and > 0, got {peak}")));
    }
    Ok(())
}
