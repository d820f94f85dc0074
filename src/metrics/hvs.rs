//! PSNR-HVS and PSNR-HVS-M (Ponomarenko et al.).
//!
//! Both metrics compare orthonormal 8×8 DCT coefficients of non-overlapping
//! blocks, weighted by a contrast sensitivity table. PSNR-HVS-M additionally
//! subtracts a per-block contrast masking threshold from every AC difference
//! before weighting. Blocks that do not fully fit in the image are ignored.
//!
//! The coefficient tables are the published reference values; results are
//! comparable across runs and tools that use the same tables.

use std::sync::Arc;

use imgref::ImgRef;
use rustdct::{DctPlanner, TransformType2And3};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Result};
use crate::metrics::validate_peak;
use crate::plane;

/// Block edge length.
pub const BLOCK: usize = 8;

/// Contrast sensitivity weights, indexed `[vertical][horizontal]` frequency.
pub const CSF_COEFFICIENTS: [[f64; BLOCK]; BLOCK] = [
    [1.608443, 2.339554, 2.573509, 1.608443, 1.072295, 0.643377, 0.504610, 0.421887],
    [2.144591, 2.144591, 1.838221, 1.354478, 0.989811, 0.443708, 0.428918, 0.467911],
    [1.838221, 1.979622, 1.608443, 1.072295, 0.643377, 0.451493, 0.372972, 0.459555],
    [1.838221, 1.513829, 1.169777, 0.887417, 0.505610, 0.295806, 0.321689, 0.415082],
    [1.429727, 1.169777, 0.695543, 0.459555, 0.378457, 0.236102, 0.249855, 0.334222],
    [1.072295, 0.735288, 0.467911, 0.402111, 0.317717, 0.247453, 0.227744, 0.279729],
    [0.525206, 0.402111, 0.329937, 0.295806, 0.249855, 0.212687, 0.214459, 0.254803],
    [0.357432, 0.279729, 0.270896, 0.262603, 0.229778, 0.257351, 0.249855, 0.259950],
];

/// Masking weights, approximately `(CSF / max(CSF))²`.
pub const MASK_COEFFICIENTS: [[f64; BLOCK]; BLOCK] = [
    [0.390625, 0.826446, 1.000000, 0.390625, 0.173611, 0.062500, 0.038447, 0.026874],
    [0.694444, 0.694444, 0.510204, 0.277008, 0.147929, 0.029727, 0.027778, 0.033058],
    [0.510204, 0.591716, 0.390625, 0.173611, 0.062500, 0.030779, 0.021004, 0.031888],
    [0.510204, 0.346021, 0.206612, 0.118906, 0.038447, 0.013212, 0.015625, 0.026015],
    [0.308642, 0.206612, 0.073046, 0.031888, 0.021626, 0.008417, 0.009426, 0.016866],
    [0.173611, 0.081633, 0.033058, 0.024414, 0.015242, 0.009246, 0.007831, 0.011891],
    [0.041649, 0.024414, 0.016437, 0.013212, 0.009426, 0.006830, 0.006944, 0.009803],
    [0.019290, 0.011891, 0.011000, 0.010412, 0.008101, 0.010025, 0.009426, 0.010203],
];

type Block = [f64; BLOCK * BLOCK];

/// Both HVS scores from a single pass over the blocks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HvsScores {
    /// CSF-weighted PSNR in dB.
    pub psnr_hvs: f64,
    /// CSF-weighted PSNR with contrast masking in dB.
    pub psnr_hvs_m: f64,
}

/// Compute PSNR-HVS and PSNR-HVS-M together.
///
/// Identical inputs yield `f64::INFINITY` for both.
///
/// # Errors
///
/// Shape mismatch, non-finite samples, an invalid `peak`, or an image with no
/// complete 8×8 block.
pub fn hvs_scores(reference: ImgRef<'_, f64>, test: ImgRef<'_, f64>, peak: f64) -> Result<HvsScores> {
    plane::ensure_same_shape(reference, test)?;
    validate_peak(peak)?;
    plane::ensure_finite(reference, "PSNR-HVS reference")?;
    plane::ensure_finite(test, "PSNR-HVS test image")?;

    let blocks_x = reference.width() / BLOCK;
    let blocks_y = reference.height() / BLOCK;
    if blocks_x == 0 || blocks_y == 0 {
        return Err(Error::EmptyInput("PSNR-HVS needs at least one 8x8 block"));
    }

    let dct = BlockDct::new();
    let mut sum_hvs = 0.0;
    let mut sum_hvs_m = 0.0;

    for by in 0..blocks_y {
        for bx in 0..blocks_x {
            let a = read_block(reference, bx * BLOCK, by * BLOCK);
            let b = read_block(test, bx * BLOCK, by * BLOCK);
            let a_dct = dct.forward(&a);
            let b_dct = dct.forward(&b);

            let mask = masking_threshold(&a, &a_dct).max(masking_threshold(&b, &b_dct));

            for k in 0..BLOCK {
                for l in 0..BLOCK {
                    let i = k * BLOCK + l;
                    let csf = CSF_COEFFICIENTS[k][l];
                    let diff = (a_dct[i] - b_dct[i]).abs();
                    sum_hvs += (diff * csf).powi(2);

                    let masked = if i == 0 {
                        diff
                    } else {
                        (diff - mask / MASK_COEFFICIENTS[k][l]).max(0.0)
                    };
                    sum_hvs_m += (masked * csf).powi(2);
                }
            }
        }
    }

    let count = (blocks_x * blocks_y * BLOCK * BLOCK) as f64;
    trace!(blocks_x, blocks_y, sum_hvs, sum_hvs_m, "hvs block sums");

    Ok(HvsScores {
        psnr_hvs: to_db(sum_hvs / count, peak),
        psnr_hvs_m: to_db(sum_hvs_m / count, peak),
    })
}

/// PSNR-HVS-M in dB.
pub fn psnr_hvs_m(reference: ImgRef<'_, f64>, test: ImgRef<'_, f64>, peak: f64) -> Result<f64> {
    Ok(hvs_scores(reference, test, peak)?.psnr_hvs_m)
}

/// PSNR-HVS in dB.
pub fn psnr_hvs(reference: ImgRef<'_, f64>, test: ImgRef<'_, f64>, peak: f64) -> Result<f64> {
    Ok(hvs_scores(reference, test, peak)?.psnr_hvs)
}

fn to_db(weighted_mse: f64, peak: f64) -> f64 {
    if weighted_mse == 0.0 {
        f64::INFINITY
    } else {
        20.0 * peak.log10() - 10.0 * weighted_mse.log10()
    }
}

fn read_block(img: ImgRef<'_, f64>, x0: usize, y0: usize) -> Block {
    let mut block = [0.0; BLOCK * BLOCK];
    for (row, dst) in img.rows().skip(y0).take(BLOCK).zip(block.chunks_exact_mut(BLOCK)) {
        dst.copy_from_slice(&row[x0..x0 + BLOCK]);
    }
    block
}

/// Contrast masking threshold of one block.
///
/// AC energy weighted by [`MASK_COEFFICIENTS`], scaled by how much of the
/// block's variance is explained by its four 4×4 quadrants.
fn masking_threshold(block: &Block, dct: &Block) -> f64 {
    let mut energy = 0.0;
    for k in 0..BLOCK {
        for l in 0..BLOCK {
            if k != 0 || l != 0 {
                energy += dct[k * BLOCK + l].powi(2) * MASK_COEFFICIENTS[k][l];
            }
        }
    }

    let total = scaled_variance(block.iter().copied());
    let ratio = if total == 0.0 {
        0.0
    } else {
        let half = BLOCK / 2;
        let quadrant = |y0: usize, x0: usize| {
            scaled_variance(
                (y0..y0 + half).flat_map(|y| (x0..x0 + half).map(move |x| block[y * BLOCK + x])),
            )
        };
        (quadrant(0, 0) + quadrant(0, half) + quadrant(half, 0) + quadrant(half, half)) / total
    };

    (energy * ratio).sqrt() / 32.0
}

/// Sample variance (N − 1) multiplied by N.
fn scaled_variance(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let n = values.clone().count() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let mean = values.clone().sum::<f64>() / n;
    let sum_sq: f64 = values.map(|v| (v - mean).powi(2)).sum();
    sum_sq / (n - 1.0) * n
}

/// Orthonormal 2-D DCT-II on 8×8 blocks.
struct BlockDct {
    dct: Arc<dyn TransformType2And3<f64>>,
}

impl BlockDct {
    fn new() -> Self {
        let mut planner = DctPlanner::new();
        Self {
            dct: planner.plan_dct2(BLOCK),
        }
    }

    fn forward(&self, block: &Block) -> Block {
        let mut out = *block;
        for row in out.chunks_exact_mut(BLOCK) {
            self.dct.process_dct2(row);
        }
        transpose(&mut out);
        for row in out.chunks_exact_mut(BLOCK) {
            self.dct.process_dct2(row);
        }
        transpose(&mut out);

        let dc = (1.0 / BLOCK as f64).sqrt();
        let ac = (2.0 / BLOCK as f64).sqrt();
        let scale = |i: usize| if i == 0 { dc } else { ac };
        for k in 0..BLOCK {
            for l in 0..BLOCK {
                out[k * BLOCK + l] *= scale(k) * scale(l);
            }
        }
        out
    }
}

fn transpose(block: &mut Block) {
    for k in 0..BLOCK {
        for l in k + 1..BLOCK {
            block.swap(k * BLOCK + l, l * BLOCK + k);
        }
    }
}
