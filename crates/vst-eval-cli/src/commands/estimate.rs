//! Noise-level estimation command.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::info;
use vst_eval::transform;
use vst_eval::{AnalysisConfig, DetailBand, MadEstimator, ReferenceEstimator, SigmaEstimator};

use super::load::load_plane;

pub fn run(
    input: PathBuf,
    clean: Option<PathBuf>,
    band: DetailBand,
    gain: f64,
    config: &AnalysisConfig,
) -> Result<()> {
    let noisy = load_plane(&input)?.plane;
    let transformed = transform::forward_floored(noisy.as_ref(), config.vst, config.floor)?;

    let (method, sigma_add) = match clean {
        Some(path) => {
            let clean = load_plane(&path)?.plane;
            if (clean.width(), clean.height()) != (noisy.width(), noisy.height()) {
                bail!("{} and {} differ in size", path.display(), input.display());
            }
            let reference = transform::forward_floored(clean.as_ref(), config.vst, config.floor)?;
            let sigma = ReferenceEstimator::new(reference)
                .estimate(transformed.as_ref())
                .context("Reference estimate failed")?;
            ("reference", sigma)
        }
        None => {
            let sigma = MadEstimator::new(band)
                .with_gain(gain)
                .estimate(transformed.as_ref())
                .context("Blind estimate failed")?;
            ("blind", sigma)
        }
    };
    let sigma_mult = transform::additive_to_multiplicative(sigma_add, config.vst)?;
    info!(method, sigma_add, sigma_mult, "noise estimate");

    println!("Image: {}", input.display());
    println!("Estimator: {method}");
    println!("sigma_add (VST domain): {sigma_add:.6}");
    println!("sigma_mult (intensity domain): {sigma_mult:.6}");

    Ok(())
}
