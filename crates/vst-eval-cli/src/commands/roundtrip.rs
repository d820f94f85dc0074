//! Transform round-trip check.

use std::path::PathBuf;

use anyhow::{Context, Result};
use vst_eval::metrics::psnr_from_mse;
use vst_eval::plane::{self, synthetic_scene};
use vst_eval::transform::{self, VstParams};

use super::load::load_plane;

pub fn run(input: Option<PathBuf>, size: usize, params: VstParams, floor: f64) -> Result<()> {
    let (image, peak, name) = match &input {
        Some(path) => {
            let loaded = load_plane(path)?;
            (loaded.plane, loaded.peak, path.display().to_string())
        }
        None => (synthetic_scene(size, size)?, 255.0, format!("synthetic {size}x{size}")),
    };

    let floored = plane::floor_positive(image.as_ref(), floor)?;
    let transformed = transform::forward(floored.as_ref(), params)?;
    let mse = transform::roundtrip_mse(floored.as_ref(), params).context("Round trip failed")?;
    let psnr = psnr_from_mse(mse, peak)?;

    println!("Image: {name}");
    println!("Transform: a = {}, b = {}", params.a, params.b);
    if let Some((lo, hi)) = plane::min_max(transformed.as_ref()) {
        println!("VST range: [{lo:.4}, {hi:.4}]");
    }
    println!("Round-trip MSE: {mse:.3e}");
    println!("Round-trip PSNR: {psnr:.2} dB");

    Ok(())
}
