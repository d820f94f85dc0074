//! Typed analysis configuration.
//!
//! Everything an analysis run needs in one serde structure, loadable from a
//! JSON file. Missing fields take their defaults.
//!
//! ```
//! use vst_eval::config::AnalysisConfig;
//!
//! let config: AnalysisConfig = serde_json::from_str(r#"{ "q_start": 25, "q_end": 35 }"#).unwrap();
//! assert_eq!(config.vst.a, 8.39);
//! assert_eq!(config.q_values().len(), 11);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::eval::sweep::SweepConfig;
use crate::metrics::{MetricConfig, TargetMetric};
use crate::noise::NoiseSeed;
use crate::transform::VstParams;

/// Parameters of a Linear vs. VST analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Transform parameters.
    pub vst: VstParams,
    /// Positive floor applied before the forward transform.
    pub floor: f64,
    /// First quantization level (inclusive).
    pub q_start: u32,
    /// Last quantization level (inclusive).
    pub q_end: u32,
    /// Distance between quantization levels.
    pub q_step: u32,
    /// Metric the optimal operating point is selected by.
    pub target: TargetMetric,
    /// Maximum representable intensity.
    pub peak: f64,
    /// Metrics computed for every sample.
    pub metrics: MetricConfig,
    /// Run Q steps in parallel.
    pub parallel: bool,
    /// Per-invocation limit for external codecs, in milliseconds.
    pub codec_timeout_ms: Option<u64>,
    /// Multiplicative noise level for synthetic inputs.
    pub noise_sigma: f64,
    /// Seed for synthetic noise; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            vst: VstParams::default(),
            floor: 1.0,
            q_start: 20,
            q_end: 51,
            q_step: 1,
            target: TargetMetric::default(),
            peak: 255.0,
            metrics: MetricConfig::default(),
            parallel: true,
            codec_timeout_ms: None,
            noise_sigma: 0.05,
            seed: None,
        }
    }
}

impl AnalysisConfig {
    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field against its valid range.
    pub fn validate(&self) -> Result<()> {
        self.vst.validate()?;
        if !(self.floor.is_finite() && self.floor > 0.0) {
            return Err(Error::invalid("floor", format!("must be finite and > 0, got {}", self.floor)));
        }
        if self.q_step == 0 {
            return Err(Error::invalid("q_step", "must be at least 1"));
        }
        if self.q_start > self.q_end {
            return Err(Error::invalid(
                "q_start",
                format!("q_start {} exceeds q_end {}", self.q_start, self.q_end),
            ));
        }
        if !(self.peak.is_finite() && self.peak > 0.0) {
            return Err(Error::invalid("peak", format!("must be finite and > 0, got {}", self.peak)));
        }
        if !(self.noise_sigma.is_finite() && self.noise_sigma >= 0.0) {
            return Err(Error::invalid(
                "noise_sigma",
                format!("must be finite and >= 0, got {}", self.noise_sigma),
            ));
        }
        if self.codec_timeout_ms == Some(0) {
            return Err(Error::invalid("codec_timeout_ms", "must be positive when set"));
        }
        Ok(())
    }

    /// Inclusive Q range expanded with `q_step`.
    #[must_use]
    pub fn q_values(&self) -> Vec<u32> {
        (self.q_start..=self.q_end)
            .step_by(self.q_step.max(1) as usize)
            .collect()
    }

    /// Sweep configuration for this run.
    pub fn sweep_config(&self) -> Result<SweepConfig> {
        self.validate()?;
        SweepConfig::builder()
            .q_values(self.q_values())
            .metrics(self.metrics.with_target(self.target))
            .peak(self.peak)
            .vst(self.vst)
            .floor(self.floor)
            .parallel(self.parallel)
            .build()
    }

    /// Codec timeout, if configured.
    #[must_use]
    pub fn codec_timeout(&self) -> Option<Duration> {
        self.codec_timeout_ms.map(Duration::from_millis)
    }

    /// Noise seed for synthetic inputs.
    #[must_use]
    pub fn noise_seed(&self) -> NoiseSeed {
        self.seed.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.vst, VstParams { a: 8.39, b: 1.2 });
        assert_eq!(config.floor, 1.0);
        assert_eq!(config.q_values().len(), 32);
        assert_eq!(config.target, TargetMetric::Psnr);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_q_values_with_step() {
        let config = AnalysisConfig {
            q_start: 20,
            q_end: 30,
            q_step: 4,
            ..AnalysisConfig::default()
        };
        assert_eq!(config.q_values(), [20, 24, 28]);
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let bad = [
            AnalysisConfig { q_step: 0, ..AnalysisConfig::default() },
            AnalysisConfig { q_start: 40, q_end: 30, ..AnalysisConfig::default() },
            AnalysisConfig { floor: 0.0, ..AnalysisConfig::default() },
            AnalysisConfig { vst: VstParams { a: 1.0, b: 1.0 }, ..AnalysisConfig::default() },
            AnalysisConfig { peak: f64::NAN, ..AnalysisConfig::default() },
            AnalysisConfig { codec_timeout_ms: Some(0), ..AnalysisConfig::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(Error::InvalidParameter { .. })), "{config:?}");
        }
    }

    #[test]
    fn test_sweep_config_includes_target() {
        let config = AnalysisConfig {
            target: TargetMetric::Dssim,
            metrics: MetricConfig::fast(),
            ..AnalysisConfig::default()
        };
        let sweep = config.sweep_config().unwrap();
        assert!(sweep.metrics.dssim);
        assert_eq!(sweep.q_values.first(), Some(&20));
        assert_eq!(sweep.q_values.last(), Some(&51));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "vst": { "a": 20.0, "b": 10.0 }, "target": "psnr_hvs_m", "codec_timeout_ms": 5000, "seed": 7 }"#,
        )
        .unwrap();

        let config = AnalysisConfig::from_json_file(&path).unwrap();
        assert_eq!(config.vst, VstParams { a: 20.0, b: 10.0 });
        assert_eq!(config.target, TargetMetric::PsnrHvsM);
        assert_eq!(config.codec_timeout(), Some(Duration::from_millis(5000)));
        assert_eq!(config.noise_seed(), NoiseSeed::Fixed(7));
        assert_eq!(config.q_start, 20);
    }

    #[test]
    fn test_from_json_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "q_step": 0 }"#).unwrap();
        assert!(AnalysisConfig::from_json_file(&path).is_err());
    }
}
