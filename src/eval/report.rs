//! Report types for domain comparisons.
//!
//! This module defines the summary table and the full analysis report, which
//! can be serialized to JSON or CSV.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::eval::analysis::Comparison;
use crate::eval::sweep::{Domain, RdSample, RdSweep, ReferenceKind};
use crate::metrics::TargetMetric;
use crate::transform::VstParams;

/// One line of the summary table: a domain at its optimal operating point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// Processing method ("Linear" or "VST").
    pub method: String,
    /// Quantization level of the optimal operating point.
    pub q_oop: u32,
    /// Metric the point was selected by.
    pub target_metric: TargetMetric,
    /// Raw value of the target metric.
    pub target_value: Option<f64>,
    /// PSNR in dB.
    pub psnr: Option<f64>,
    /// PSNR-HVS-M in dB.
    pub psnr_hvs_m: Option<f64>,
    /// Mean squared error.
    pub mse: Option<f64>,
    /// Bitstream size in bytes.
    pub filesize_bytes: usize,
    /// Uncompressed size / bitstream size.
    pub compression_ratio: f64,
}

impl SummaryRow {
    /// Row for `sample` in `domain`.
    #[must_use]
    pub fn from_sample(domain: Domain, sample: &RdSample, target: TargetMetric) -> Self {
        Self {
            method: domain.to_string(),
            q_oop: sample.q,
            target_metric: target,
            target_value: sample.metrics.get(target),
            psnr: sample.metrics.psnr,
            psnr_hvs_m: sample.metrics.psnr_hvs_m,
            mse: sample.metrics.mse,
            filesize_bytes: sample.bitstream_size_bytes,
            compression_ratio: sample.compression_ratio,
        }
    }
}

/// Complete record of a domain comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Report name or identifier.
    pub name: String,

    /// When this report was generated.
    #[serde(with = "chrono_serde")]
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Codec identifier.
    pub codec: String,

    /// What the reconstructions were scored against.
    pub reference_kind: ReferenceKind,

    /// Transform parameters.
    pub vst: VstParams,

    /// Blind additive noise estimate in the VST domain.
    pub estimated_sigma_add: f64,

    /// Summary table, Linear first.
    pub summary: Vec<SummaryRow>,

    /// BD-rate of VST vs. Linear over PSNR, in percent.
    pub bd_rate_percent: Option<f64>,

    /// Full per-domain sweeps.
    pub sweeps: Vec<RdSweep>,
}

impl AnalysisReport {
    /// Build a report from a finished comparison.
    #[must_use]
    pub fn from_comparison(name: impl Into<String>, comparison: &Comparison) -> Self {
        Self {
            name: name.into(),
            timestamp: chrono::Utc::now(),
            codec: comparison.linear.codec.clone(),
            reference_kind: comparison.linear.reference_kind,
            vst: comparison.vst,
            estimated_sigma_add: comparison.estimated_sigma_add,
            summary: comparison.summary_rows(),
            bd_rate_percent: comparison.bd_rate(),
            sweeps: vec![comparison.linear.clone(), comparison.vst_sweep.clone()],
        }
    }

    /// Write the full report as pretty JSON.
    ///
    /// JSON has no infinity; an infinite PSNR is written as `null`.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        create_parent(path)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Write the summary table as CSV.
    pub fn write_summary_csv(&self, path: &Path) -> Result<()> {
        create_parent(path)?;
        let mut wtr = csv::Writer::from_path(path)?;

        wtr.write_record([
            "method",
            "q_oop",
            "target_metric",
            "target_value",
            "psnr",
            "psnr_hvs_m",
            "mse",
            "filesize_bytes",
            "compression_ratio",
        ])?;

        for row in &self.summary {
            wtr.write_record([
                &row.method,
                &row.q_oop.to_string(),
                &row.target_metric.to_string(),
                &format_opt(row.target_value, 6),
                &format_opt(row.psnr, 4),
                &format_opt(row.psnr_hvs_m, 4),
                &format_opt(row.mse, 6),
                &row.filesize_bytes.to_string(),
                &format!("{:.4}", row.compression_ratio),
            ])?;
        }

        wtr.flush()?;
        Ok(())
    }

    /// Write every sample of both sweeps as CSV.
    pub fn write_curves_csv(&self, path: &Path) -> Result<()> {
        create_parent(path)?;
        let mut wtr = csv::Writer::from_path(path)?;

        wtr.write_record([
            "domain",
            "q",
            "bitstream_size_bytes",
            "bpp",
            "compression_ratio",
            "encode_ms",
            "decode_ms",
            "mse",
            "psnr",
            "psnr_hvs",
            "psnr_hvs_m",
            "dssim",
        ])?;

        for sweep in &self.sweeps {
            for sample in &sweep.samples {
                wtr.write_record([
                    &sweep.domain.to_string(),
                    &sample.q.to_string(),
                    &sample.bitstream_size_bytes.to_string(),
                    &format!("{:.4}", sample.bits_per_pixel),
                    &format!("{:.4}", sample.compression_ratio),
                    &sample.encode_time.as_millis().to_string(),
                    &sample.decode_time.as_millis().to_string(),
                    &format_opt(sample.metrics.mse, 6),
                    &format_opt(sample.metrics.psnr, 4),
                    &format_opt(sample.metrics.psnr_hvs, 4),
                    &format_opt(sample.metrics.psnr_hvs_m, 4),
                    &format_opt(sample.metrics.dssim, 6),
                ])?;
            }
        }

        wtr.flush()?;
        Ok(())
    }
}

fn format_opt(value: Option<f64>, precision: usize) -> String {
    value.map_or(String::new(), |v| format!("{v:.precision$}"))
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

// Custom serialization for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod chrono_serde {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        dt.to_rfc3339().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
