//! # vst-eval
//!
//! Variance-stabilizing transform analysis and rate-distortion evaluation for
//! speckle (multiplicative-noise) imagery.
//!
//! The library answers one question: does a lossy codec do better on the
//! intensity image, or on its logarithmic VST where speckle becomes additive
//! noise of constant variance? External codecs plug in through
//! [`CodecAdapter`]; the library handles the transform, noise synthesis,
//! blind noise estimation, metrics, sweeps, and reports.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vst_eval::codec::ExternalCommandCodec;
//! use vst_eval::eval::{compare_domains, CancelToken, SweepConfig, SweepInput};
//! use vst_eval::metrics::TargetMetric;
//! use vst_eval::noise::{apply_speckle, NoiseSeed};
//! use vst_eval::plane::synthetic_scene;
//!
//! let clean = synthetic_scene(256, 256)?;
//! let noisy = apply_speckle(clean.as_ref(), 0.05, NoiseSeed::Fixed(42))?;
//! let input = SweepInput::new(clean, noisy)?;
//!
//! let codec = ExternalCommandCodec::bpg("/usr/local/bin");
//! let config = SweepConfig::builder().q_values(20..=51).build()?;
//! let comparison = compare_domains(&codec, &input, &config, TargetMetric::PsnrHvsM, &CancelToken::new())?;
//!
//! for row in comparison.summary_rows() {
//!     println!("{}: Q={} size={}", row.method, row.q_oop, row.filesize_bytes);
//! }
//! # Ok::<(), vst_eval::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`error`]: Error types for the library
//! - [`plane`]: Single-channel image helpers and synthetic scenes
//! - [`transform`]: Forward/inverse VST and noise-level conversion
//! - [`noise`]: Multiplicative speckle synthesis
//! - [`estimate`]: Blind and reference noise-level estimators
//! - [`metrics`]: MSE, PSNR, PSNR-HVS(-M), DSSIM
//! - [`codec`]: Codec adapter contract and external command codec
//! - [`eval`]: Sweeps, OOP search, domain comparison, reports
//! - [`error_map`]: Relative error map
//! - [`stats`]: Descriptive statistics and BD-rate
//! - [`config`]: Typed analysis configuration

pub mod codec;
pub mod config;
pub mod error;
pub mod error_map;
pub mod estimate;
pub mod eval;
pub mod metrics;
pub mod noise;
pub mod plane;
pub mod stats;
pub mod transform;

// Re-export commonly used types
pub use codec::{Bitstream, CodecAdapter, SampleRange};
pub use config::AnalysisConfig;
pub use error::{Error, Result};
pub use estimate::{DetailBand, MadEstimator, ReferenceEstimator, SigmaEstimator};
pub use eval::{
    compare_domains, find_oop, run_sweep, AnalysisReport, CancelToken, Comparison, Domain,
    RdSample, RdSweep, SummaryRow, SweepConfig, SweepInput,
};
pub use metrics::{MetricConfig, MetricResult, TargetMetric};
pub use plane::Plane;
pub use stats::Summary;
pub use transform::VstParams;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::linear_ramp;

    #[test]
    fn test_end_to_end_ramp_round_trip() {
        let ramp = linear_ramp(64, 64, 1.0, 255.0).unwrap();
        let params = VstParams::new(20.0, 10.0).unwrap();

        let forward = transform::forward(ramp.as_ref(), params).unwrap();
        let restored = transform::inverse(forward.as_ref(), params).unwrap();

        let mse = metrics::mse(ramp.as_ref(), restored.as_ref()).unwrap();
        assert!(mse < 1e-18, "mse {mse}");
        let psnr = metrics::psnr_from_mse(mse, 255.0).unwrap();
        assert!(psnr.is_infinite() || psnr > 150.0, "psnr {psnr}");
    }
}
