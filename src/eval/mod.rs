//! Rate-distortion evaluation.
//!
//! This module provides the evaluation pipeline:
//!
//! - [`sweep`]: per-domain Q sweep, cancellation, and OOP search
//! - [`analysis`]: Linear vs. VST comparison and single reconstructions
//! - [`report`]: summary rows and CSV/JSON report writers
//! - [`helpers`]: single-pair evaluation and quality assertions

pub mod analysis;
pub mod helpers;
pub mod report;
pub mod sweep;

pub use analysis::{compare_domains, reconstruct, Comparison, Reconstruction};
pub use report::{AnalysisReport, SummaryRow};
pub use sweep::{
    find_oop, run_sweep, CancelToken, Domain, RdSample, RdSweep, ReferenceKind, StepFailure,
    StepStage, SweepConfig, SweepInput,
};
