//! Error types for vst-eval operations.

use std::time::Duration;

use thiserror::Error;

use crate::eval::sweep::{Domain, RdSweep, StepFailure};

/// Result type alias for vst-eval operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during transform analysis and codec evaluation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A transform, noise, or sweep parameter is outside its valid domain.
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Image dimensions don't match between reference and test images.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Expected dimensions (width, height).
        expected: (usize, usize),
        /// Actual dimensions (width, height).
        actual: (usize, usize),
    },

    /// A statistic was requested over zero samples.
    #[error("Empty input: {0}")]
    EmptyInput(&'static str),

    /// An input array contains NaN or infinite samples.
    #[error("Non-finite input: {0}")]
    NonFiniteInput(&'static str),

    /// Failed to calculate a quality metric.
    #[error("Metric calculation failed: {metric}: {reason}")]
    MetricCalculation {
        /// Name of the metric that failed.
        metric: String,
        /// Reason for the failure.
        reason: String,
    },

    /// Reconstruction quality is outside an asserted threshold.
    #[error("Quality below threshold: {metric} = {value:.4} (threshold: {threshold:.4})")]
    QualityBelowThreshold {
        /// Name of the metric.
        metric: String,
        /// Measured value.
        value: f64,
        /// Threshold that was violated.
        threshold: f64,
    },

    /// No Q step of a sweep produced a sample.
    #[error(
        "Sweep exhausted in {domain} domain: none of {attempted} Q steps succeeded{}",
        first_failure(.failures)
    )]
    SweepExhausted {
        /// Processing domain of the sweep.
        domain: Domain,
        /// Number of Q values that were scheduled.
        attempted: usize,
        /// Why each step failed, ascending by Q.
        failures: Vec<StepFailure>,
    },

    /// A domain comparison was cancelled before both sweeps finished.
    #[error("Comparison cancelled after {} sweep(s)", .sweeps.len())]
    Cancelled {
        /// Sweeps that ran, Linear first; the last one is marked cancelled.
        sweeps: Vec<RdSweep>,
    },

    /// Error from a codec during compression or decompression.
    #[error("Codec error ({codec}): {message}")]
    Codec {
        /// Codec identifier.
        codec: String,
        /// Error message from the codec.
        message: String,
    },

    /// An external codec invocation exceeded its time limit and was killed.
    #[error("Codec timeout ({codec}): no result after {timeout:?}")]
    CodecTimeout {
        /// Codec identifier.
        codec: String,
        /// Configured limit.
        timeout: Duration,
    },

    /// I/O error wrapper.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

fn first_failure(failures: &[StepFailure]) -> String {
    failures
        .first()
        .map(|f| format!(" (first failure: {f})"))
        .unwrap_or_default()
}

impl Error {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
