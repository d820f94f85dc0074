//! Noise-level conversion.

use anyhow::Result;
use vst_eval::transform::{self, VstParams};

pub fn run(value: f64, inverse: bool, params: VstParams) -> Result<()> {
    if inverse {
        let sigma_mult = transform::additive_to_multiplicative(value, params)?;
        println!("sigma_add = {value:.6} -> sigma_mult = {sigma_mult:.6}");
    } else {
        let sigma_add = transform::sigma_to_additive(value, params)?;
        println!("sigma_mult = {value:.6} -> sigma_add = {sigma_add:.6}");
    }
    Ok(())
}
