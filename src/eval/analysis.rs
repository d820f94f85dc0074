//! Linear vs. VST domain comparison.
//!
//! Runs the same sweep in both domains, locates each optimal operating point,
//! and condenses the result into the summary table consumed by reports.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::codec::CodecAdapter;
use crate::error::{Error, Result};
use crate::error_map::error_map;
use crate::estimate::{MadEstimator, SigmaEstimator};
use crate::eval::report::SummaryRow;
use crate::eval::sweep::{
    domain_source, run_sweep, CancelToken, Domain, RdSample, RdSweep, SweepConfig, SweepInput,
};
use crate::metrics::TargetMetric;
use crate::plane::Plane;
use crate::stats;
use crate::transform::{self, VstParams};

/// Both sweeps and their optimal operating points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    /// Metric the operating points were selected by.
    pub target: TargetMetric,
    /// Transform used for the VST sweep.
    pub vst: VstParams,
    /// Blind estimate of the additive noise level in the VST domain.
    pub estimated_sigma_add: f64,
    /// Same estimate expressed as a multiplicative noise level.
    pub estimated_sigma_mult: f64,
    /// Sweep with the codec on the intensity image.
    pub linear: RdSweep,
    /// Sweep with the codec on the transformed image.
    pub vst_sweep: RdSweep,
    /// Optimal operating point of the linear sweep.
    pub linear_oop: RdSample,
    /// Optimal operating point of the VST sweep.
    pub vst_oop: RdSample,
}

impl Comparison {
    /// Sweep for `domain`.
    #[must_use]
    pub fn sweep(&self, domain: Domain) -> &RdSweep {
        match domain {
            Domain::Linear => &self.linear,
            Domain::Vst => &self.vst_sweep,
        }
    }

    /// Optimal operating point for `domain`.
    #[must_use]
    pub fn oop(&self, domain: Domain) -> &RdSample {
        match domain {
            Domain::Linear => &self.linear_oop,
            Domain::Vst => &self.vst_oop,
        }
    }

    /// One summary row per domain, Linear first.
    #[must_use]
    pub fn summary_rows(&self) -> Vec<SummaryRow> {
        Domain::ALL
            .iter()
            .map(|&domain| SummaryRow::from_sample(domain, self.oop(domain), self.target))
            .collect()
    }

    /// Bjøntegaard delta rate of VST vs. Linear over PSNR, in percent.
    ///
    /// `None` unless both curves have at least four finite points with
    /// overlapping quality ranges. Negative means VST needs fewer bits.
    #[must_use]
    pub fn bd_rate(&self) -> Option<f64> {
        stats::bd_rate(
            &self.linear.curve(TargetMetric::Psnr),
            &self.vst_sweep.curve(TargetMetric::Psnr),
        )
    }
}

/// Sweep both domains and select the optimal operating points.
///
/// # Errors
///
/// Any error from [`run_sweep`] (including [`crate::Error::SweepExhausted`]
/// for either domain), or no sample carrying `target`. Cancellation yields
/// [`crate::Error::Cancelled`] holding the sweeps that ran; the VST sweep is
/// not started once the token is set.
pub fn compare_domains<C: CodecAdapter + ?Sized>(
    codec: &C,
    input: &SweepInput,
    config: &SweepConfig,
    target: TargetMetric,
    cancel: &CancelToken,
) -> Result<Comparison> {
    let config = SweepConfig {
        metrics: config.metrics.with_target(target),
        ..config.clone()
    };

    let transformed = domain_source(input, Domain::Vst, &config)?;
    let estimated_sigma_add = MadEstimator::default().estimate(transformed.as_ref())?;
    let estimated_sigma_mult = transform::additive_to_multiplicative(estimated_sigma_add, config.vst)?;

    let linear = run_sweep(codec, input, Domain::Linear, &config, cancel)?;
    if linear.cancelled {
        return Err(Error::Cancelled { sweeps: vec![linear] });
    }
    let vst_sweep = run_sweep(codec, input, Domain::Vst, &config, cancel)?;
    if vst_sweep.cancelled {
        return Err(Error::Cancelled {
            sweeps: vec![linear, vst_sweep],
        });
    }

    let linear_oop = linear.oop(target)?.clone();
    let vst_oop = vst_sweep.oop(target)?.clone();

    info!(
        codec = codec.id(),
        %target,
        linear_q = linear_oop.q,
        vst_q = vst_oop.q,
        estimated_sigma_add,
        "domain comparison finished"
    );

    Ok(Comparison {
        target,
        vst: config.vst,
        estimated_sigma_add,
        estimated_sigma_mult,
        linear,
        vst_sweep,
        linear_oop,
        vst_oop,
    })
}

/// A single reconstruction with its relative error map.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// Processing domain.
    pub domain: Domain,
    /// Quantization level.
    pub q: u32,
    /// Bitstream size charged by the codec.
    pub bitstream_size_bytes: usize,
    /// Reconstructed intensity image.
    pub image: Plane,
    /// Relative error map against the sweep reference, values in `[0, 255]`.
    pub error_map: Plane,
}

/// Re-run one Q step and keep the reconstruction (e.g. at an OOP).
///
/// Unlike a sweep step, any failure here is returned as an error.
pub fn reconstruct<C: CodecAdapter + ?Sized>(
    codec: &C,
    input: &SweepInput,
    domain: Domain,
    config: &SweepConfig,
    q: u32,
) -> Result<Reconstruction> {
    let source = domain_source(input, domain, config)?;
    let bitstream = codec.compress(source.as_ref(), q)?;
    let decoded = codec.decompress(&bitstream)?;
    let image = match domain {
        Domain::Linear => decoded,
        Domain::Vst => transform::inverse(decoded.as_ref(), config.vst)?,
    };
    crate::plane::ensure_same_shape(input.reference(), image.as_ref())?;
    let error_map = error_map(input.reference(), image.as_ref())?;

    Ok(Reconstruction {
        domain,
        q,
        bitstream_size_bytes: codec.size_bytes(&bitstream),
        image,
        error_map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::sweep::tests::StepQuantizer;
    use crate::metrics::MetricConfig;
    use crate::noise::{apply_speckle, NoiseSeed};
    use crate::plane::synthetic_scene;

    fn input() -> SweepInput {
        let clean = synthetic_scene(48, 48).unwrap();
        let noisy = apply_speckle(clean.as_ref(), 0.05, NoiseSeed::Fixed(9)).unwrap();
        SweepInput::new(clean, noisy).unwrap()
    }

    fn config() -> SweepConfig {
        SweepConfig::builder()
            .q_values(10..40)
            .metrics(MetricConfig::fast())
            .build()
            .unwrap()
    }

    #[test]
    fn test_compare_domains() {
        let comparison = compare_domains(
            &StepQuantizer::new(),
            &input(),
            &config(),
            TargetMetric::PsnrHvsM,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(comparison.linear.samples.len(), 30);
        assert_eq!(comparison.vst_sweep.samples.len(), 30);
        // The target metric is added even though the config only asked for MSE/PSNR.
        assert!(comparison.linear_oop.metrics.psnr_hvs_m.is_some());
        assert!(comparison.estimated_sigma_add > 0.0);

        let rows = comparison.summary_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].method, "Linear");
        assert_eq!(rows[1].method, "VST");
        assert_eq!(rows[1].q_oop, comparison.vst_oop.q);
        assert_eq!(rows[0].target_value, comparison.linear_oop.metrics.psnr_hvs_m);
    }

    #[test]
    fn test_bd_rate_available_for_full_curves() {
        let comparison = compare_domains(
            &StepQuantizer::new(),
            &input(),
            &config(),
            TargetMetric::Psnr,
            &CancelToken::new(),
        )
        .unwrap();
        assert!(comparison.bd_rate().is_some_and(f64::is_finite));
    }

    #[test]
    fn test_cancel_during_linear_sweep_keeps_linear_results() {
        let token = CancelToken::new();
        let mut codec = StepQuantizer::new();
        codec.cancel_at = Some((15, token.clone()));
        let config = SweepConfig::builder()
            .q_values(10..16)
            .metrics(MetricConfig::fast())
            .parallel(false)
            .build()
            .unwrap();

        let err = compare_domains(&codec, &input(), &config, TargetMetric::Psnr, &token).unwrap_err();
        let sweeps = match err {
            Error::Cancelled { sweeps } => sweeps,
            other => panic!("expected Cancelled, got {other:?}"),
        };
        assert_eq!(sweeps.len(), 1);
        assert_eq!(sweeps[0].domain, Domain::Linear);
        assert!(sweeps[0].cancelled);
        assert_eq!(sweeps[0].samples.iter().map(|s| s.q).collect::<Vec<_>>(), [10, 11, 12, 13, 14, 15]);
        assert!(sweeps[0].oop(TargetMetric::Psnr).is_ok());
    }

    #[test]
    fn test_pre_cancelled_comparison_is_not_exhausted() {
        let token = CancelToken::new();
        token.cancel();

        let err = compare_domains(&StepQuantizer::new(), &input(), &config(), TargetMetric::Psnr, &token).unwrap_err();
        let sweeps = match err {
            Error::Cancelled { sweeps } => sweeps,
            other => panic!("expected Cancelled, got {other:?}"),
        };
        assert_eq!(sweeps.len(), 1);
        assert!(sweeps[0].samples.is_empty());
        assert_eq!(sweeps[0].skipped.len(), 30);
    }

    #[test]
    fn test_reconstruct_error_map() {
        let input = input();
        let rec = reconstruct(&StepQuantizer::new(), &input, Domain::Vst, &config(), 12).unwrap();
        assert_eq!((rec.image.width(), rec.image.height()), (48, 48));
        assert!(rec.error_map.pixels().all(|v| (0.0..=255.0).contains(&v)));
        assert!(rec.bitstream_size_bytes > 0);
    }
}
