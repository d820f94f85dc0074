//! Rate-distortion sweep over a quantization range.
//!
//! Every Q step walks `Pending → Compressed → Decompressed → Scored`. A step
//! that fails is recorded as a [`StepFailure`] and the sweep moves on; only an
//! uncancelled sweep with no scored step at all is an error.
//!
//! Steps are independent and run on the rayon pool when
//! [`SweepConfig::parallel`] is set. Results are ordered by Q regardless of
//! scheduling.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use imgref::ImgRef;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec::CodecAdapter;
use crate::error::{Error, Result};
use crate::eval::helpers::evaluate_single;
use crate::eval::report::duration_millis;
use crate::metrics::{validate_peak, MetricConfig, MetricResult, TargetMetric};
use crate::plane::{self, Plane};
use crate::transform::{self, VstParams};

/// Processing domain the codec operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    /// Codec sees the intensity image directly.
    Linear,
    /// Codec sees the forward VST; reconstructions are inverted before scoring.
    Vst,
}

impl Domain {
    /// Both domains, Linear first.
    pub const ALL: [Domain; 2] = [Domain::Linear, Domain::Vst];
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => f.write_str("Linear"),
            Self::Vst => f.write_str("VST"),
        }
    }
}

/// What the reconstructions are scored against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceKind {
    /// Clean ground truth.
    GroundTruth,
    /// The noisy input itself, for acquisitions without ground truth.
    NoisyInput,
}

/// Images a sweep compresses and scores against.
#[derive(Debug, Clone)]
pub struct SweepInput {
    reference: Plane,
    noisy: Plane,
    kind: ReferenceKind,
}

impl SweepInput {
    /// Compress `noisy`, score against the clean `reference`.
    pub fn new(reference: Plane, noisy: Plane) -> Result<Self> {
        plane::ensure_same_shape(reference.as_ref(), noisy.as_ref())?;
        plane::ensure_non_empty(noisy.as_ref(), "sweep input")?;
        Ok(Self {
            reference,
            noisy,
            kind: ReferenceKind::GroundTruth,
        })
    }

    /// Compress and score against the same noisy image.
    ///
    /// Results are marked [`ReferenceKind::NoisyInput`]; they measure fidelity
    /// to the noisy acquisition, not to the underlying scene.
    pub fn without_ground_truth(noisy: Plane) -> Result<Self> {
        plane::ensure_non_empty(noisy.as_ref(), "sweep input")?;
        Ok(Self {
            reference: noisy.clone(),
            noisy,
            kind: ReferenceKind::NoisyInput,
        })
    }

    /// Scoring reference.
    #[must_use]
    pub fn reference(&self) -> ImgRef<'_, f64> {
        self.reference.as_ref()
    }

    /// Image handed to the codec (before any transform).
    #[must_use]
    pub fn noisy(&self) -> ImgRef<'_, f64> {
        self.noisy.as_ref()
    }

    /// Whether the reference is ground truth.
    #[must_use]
    pub fn reference_kind(&self) -> ReferenceKind {
        self.kind
    }
}

/// Parameters shared by every step of a sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Quantization levels, ascending and unique.
    pub q_values: Vec<u32>,
    /// Metrics computed for each sample.
    pub metrics: MetricConfig,
    /// Maximum representable intensity.
    pub peak: f64,
    /// Transform used in the VST domain.
    pub vst: VstParams,
    /// Positive floor applied before the forward transform.
    pub floor: f64,
    /// Bytes per uncompressed sample for the compression ratio.
    pub bytes_per_sample: usize,
    /// Run Q steps on the rayon pool.
    pub parallel: bool,
}

impl SweepConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> SweepConfigBuilder {
        SweepConfigBuilder::default()
    }
}

/// Builder for [`SweepConfig`].
#[derive(Debug, Default)]
pub struct SweepConfigBuilder {
    q_values: Option<Vec<u32>>,
    metrics: Option<MetricConfig>,
    peak: Option<f64>,
    vst: Option<VstParams>,
    floor: Option<f64>,
    bytes_per_sample: Option<usize>,
    parallel: Option<bool>,
}

impl SweepConfigBuilder {
    /// Set the quantization levels (any order, duplicates allowed).
    #[must_use]
    pub fn q_values(mut self, q_values: impl IntoIterator<Item = u32>) -> Self {
        self.q_values = Some(q_values.into_iter().collect());
        self
    }

    /// Set which metrics to calculate.
    #[must_use]
    pub fn metrics(mut self, metrics: MetricConfig) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the peak intensity.
    #[must_use]
    pub fn peak(mut self, peak: f64) -> Self {
        self.peak = Some(peak);
        self
    }

    /// Set the transform parameters.
    #[must_use]
    pub fn vst(mut self, vst: VstParams) -> Self {
        self.vst = Some(vst);
        self
    }

    /// Set the positive floor.
    #[must_use]
    pub fn floor(mut self, floor: f64) -> Self {
        self.floor = Some(floor);
        self
    }

    /// Set the uncompressed bytes per sample.
    #[must_use]
    pub fn bytes_per_sample(mut self, bytes: usize) -> Self {
        self.bytes_per_sample = Some(bytes);
        self
    }

    /// Enable or disable parallel steps.
    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }

    /// Build and validate the configuration.
    ///
    /// Defaults: Q 20..=51, standard metrics, peak 255, default VST, floor 1.0,
    /// one byte per sample, parallel.
    pub fn build(self) -> Result<SweepConfig> {
        let mut q_values = self.q_values.unwrap_or_else(|| (20..=51).collect());
        q_values.sort_unstable();
        q_values.dedup();
        if q_values.is_empty() {
            return Err(Error::invalid("q_values", "at least one quantization level is required"));
        }

        let peak = self.peak.unwrap_or(255.0);
        validate_peak(peak)?;

        let vst = self.vst.unwrap_or_default();
        vst.validate()?;

        let floor = self.floor.unwrap_or(1.0);
        if !(floor.is_finite() && floor > 0.0) {
            return Err(Error::invalid("floor", format!("must be finite and > 0, got {floor}")));
        }

        let bytes_per_sample = self.bytes_per_sample.unwrap_or(1);
        if bytes_per_sample == 0 {
            return Err(Error::invalid("bytes_per_sample", "must be at least 1"));
        }

        Ok(SweepConfig {
            q_values,
            metrics: self.metrics.unwrap_or_default(),
            peak,
            vst,
            floor,
            bytes_per_sample,
            parallel: self.parallel.unwrap_or(true),
        })
    }
}

/// Cooperative cancellation flag shared between a sweep and its caller.
///
/// Once set, no new Q step starts. Steps already running finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Stage a Q step had reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStage {
    /// Not yet compressed.
    Pending,
    /// Bitstream produced.
    Compressed,
    /// Reconstruction available in the intensity domain.
    Decompressed,
    /// Metrics computed.
    Scored,
}

/// A Q step that did not produce a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    /// Quantization level.
    pub q: u32,
    /// Stage the step was in when it failed.
    pub stage: StepStage,
    /// Error message.
    pub reason: String,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q={} at {:?}: {}", self.q, self.stage, self.reason)
    }
}

/// One scored point of a rate-distortion curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RdSample {
    /// Quantization level.
    pub q: u32,
    /// Bitstream size charged by the codec.
    pub bitstream_size_bytes: usize,
    /// Bits per pixel.
    pub bits_per_pixel: f64,
    /// Uncompressed size / bitstream size.
    pub compression_ratio: f64,
    /// Encoding time.
    #[serde(with = "duration_millis")]
    pub encode_time: Duration,
    /// Decoding time.
    #[serde(with = "duration_millis")]
    pub decode_time: Duration,
    /// Distortion against the sweep reference.
    pub metrics: MetricResult,
}

/// Outcome of a sweep in one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RdSweep {
    /// Processing domain.
    pub domain: Domain,
    /// Codec identifier.
    pub codec: String,
    /// What the samples were scored against.
    pub reference_kind: ReferenceKind,
    /// Uncompressed size used for compression ratios.
    pub raw_size_bytes: usize,
    /// Scored samples, ascending by Q.
    pub samples: Vec<RdSample>,
    /// Steps that failed, ascending by Q.
    pub failures: Vec<StepFailure>,
    /// Q values never started because the sweep was cancelled.
    pub skipped: Vec<u32>,
    /// Whether cancellation was observed.
    pub cancelled: bool,
}

impl RdSweep {
    /// Optimal operating point under `target`.
    pub fn oop(&self, target: TargetMetric) -> Result<&RdSample> {
        find_oop(&self.samples, target)
    }

    /// `(bits_per_pixel, value)` points for samples carrying `metric` with a
    /// finite value.
    #[must_use]
    pub fn curve(&self, metric: TargetMetric) -> Vec<(f64, f64)> {
        self.samples
            .iter()
            .filter_map(|s| s.metrics.get(metric).map(|v| (s.bits_per_pixel, v)))
            .filter(|(_, v)| v.is_finite())
            .collect()
    }
}

/// Select the sample maximizing `target.score()`.
///
/// Ties go to the smallest Q, then the smallest bitstream, so the result does
/// not depend on sample order. Samples without the metric (or with a NaN
/// value) are ignored.
///
/// # Errors
///
/// [`Error::EmptyInput`] for an empty slice, [`Error::InvalidParameter`] when
/// no sample carries the metric.
pub fn find_oop(samples: &[RdSample], target: TargetMetric) -> Result<&RdSample> {
    if samples.is_empty() {
        return Err(Error::EmptyInput("rate-distortion samples"));
    }
    samples
        .iter()
        .filter_map(|s| {
            s.metrics
                .get(target)
                .filter(|v| !v.is_nan())
                .map(|v| (target.score(v), s))
        })
        .max_by(|(score_a, a), (score_b, b)| {
            score_a
                .total_cmp(score_b)
                .then_with(|| b.q.cmp(&a.q))
                .then_with(|| b.bitstream_size_bytes.cmp(&a.bitstream_size_bytes))
        })
        .map(|(_, s)| s)
        .ok_or_else(|| Error::invalid("target", format!("no sample carries {target}")))
}

enum StepOutcome {
    Scored(RdSample),
    Failed(StepFailure),
    Skipped(u32),
}

struct StepContext<'a, C: ?Sized> {
    codec: &'a C,
    domain: Domain,
    source: ImgRef<'a, f64>,
    reference: ImgRef<'a, f64>,
    config: &'a SweepConfig,
    raw_size_bytes: usize,
}

impl<C: CodecAdapter + ?Sized> StepContext<'_, C> {
    fn run(&self, q: u32) -> std::result::Result<RdSample, StepFailure> {
        let fail = |stage: StepStage, reason: String| StepFailure { q, stage, reason };

        let started = Instant::now();
        let bitstream = self
            .codec
            .compress(self.source, q)
            .map_err(|e| fail(StepStage::Pending, e.to_string()))?;
        let encode_time = started.elapsed();

        let size = self.codec.size_bytes(&bitstream);
        if size == 0 {
            return Err(fail(StepStage::Compressed, "codec produced an empty bitstream".to_string()));
        }

        let started = Instant::now();
        let decoded = self
            .codec
            .decompress(&bitstream)
            .map_err(|e| fail(StepStage::Compressed, e.to_string()))?;
        let decode_time = started.elapsed();

        let reconstruction = match self.domain {
            Domain::Linear => decoded,
            Domain::Vst => transform::inverse(decoded.as_ref(), self.config.vst)
                .map_err(|e| fail(StepStage::Decompressed, e.to_string()))?,
        };

        let metrics = evaluate_single(
            self.reference,
            reconstruction.as_ref(),
            self.config.peak,
            &self.config.metrics,
        )
        .map_err(|e| fail(StepStage::Decompressed, e.to_string()))?;

        let pixels = (self.source.width() * self.source.height()) as f64;
        debug!(domain = %self.domain, q, size, psnr = ?metrics.psnr, "step scored");

        Ok(RdSample {
            q,
            bitstream_size_bytes: size,
            bits_per_pixel: (size * 8) as f64 / pixels,
            compression_ratio: self.raw_size_bytes as f64 / size as f64,
            encode_time,
            decode_time,
            metrics,
        })
    }
}

/// Image the codec sees in `domain`: the noisy input, or its floored forward VST.
pub fn domain_source(input: &SweepInput, domain: Domain, config: &SweepConfig) -> Result<Plane> {
    match domain {
        Domain::Linear => Ok(input.noisy.clone()),
        Domain::Vst => transform::forward_floored(input.noisy(), config.vst, config.floor),
    }
}

/// Sweep every Q of `config` in one domain.
///
/// The transformed image is computed once and shared by all steps.
///
/// # Errors
///
/// Parameter errors from the forward transform, or
/// [`Error::SweepExhausted`] (carrying every step failure) when no step was
/// scored. A cancelled sweep is returned as `Ok` with `cancelled` set, even
/// if no step completed.
pub fn run_sweep<C: CodecAdapter + ?Sized>(
    codec: &C,
    input: &SweepInput,
    domain: Domain,
    config: &SweepConfig,
    cancel: &CancelToken,
) -> Result<RdSweep> {
    let source = domain_source(input, domain, config)?;
    let ctx = StepContext {
        codec,
        domain,
        source: source.as_ref(),
        reference: input.reference(),
        config,
        raw_size_bytes: plane::raw_size_bytes(input.noisy(), config.bytes_per_sample),
    };

    info!(codec = codec.id(), %domain, steps = config.q_values.len(), parallel = config.parallel, "starting sweep");

    let step = |&q: &u32| {
        if cancel.is_cancelled() {
            return StepOutcome::Skipped(q);
        }
        match ctx.run(q) {
            Ok(sample) => StepOutcome::Scored(sample),
            Err(failure) => StepOutcome::Failed(failure),
        }
    };

    let outcomes: Vec<StepOutcome> = if config.parallel {
        config.q_values.par_iter().map(step).collect()
    } else {
        config.q_values.iter().map(step).collect()
    };

    let mut samples = Vec::new();
    let mut failures = Vec::new();
    let mut skipped = Vec::new();
    for outcome in outcomes {
        match outcome {
            StepOutcome::Scored(sample) => samples.push(sample),
            StepOutcome::Failed(failure) => {
                warn!(codec = codec.id(), %domain, q = failure.q, stage = ?failure.stage, reason = %failure.reason, "step failed");
                failures.push(failure);
            }
            StepOutcome::Skipped(q) => skipped.push(q),
        }
    }
    samples.sort_by_key(|s| s.q);
    failures.sort_by_key(|f| f.q);
    skipped.sort_unstable();

    let cancelled = cancel.is_cancelled();
    if cancelled {
        info!(%domain, completed = samples.len(), skipped = skipped.len(), "sweep cancelled");
    }

    if samples.is_empty() && !cancelled {
        return Err(Error::SweepExhausted {
            domain,
            attempted: config.q_values.len(),
            failures,
        });
    }

    if !cancelled {
        info!(%domain, samples = samples.len(), failures = failures.len(), "sweep finished");
    }

    Ok(RdSweep {
        domain,
        codec: codec.id().to_string(),
        reference_kind: input.reference_kind(),
        raw_size_bytes: ctx.raw_size_bytes,
        samples,
        failures,
        skipped,
        cancelled,
    })
}
