//! Multiplicative speckle noise synthesis.
//!
//! Speckle is modelled as a unit-mean gamma field `N ~ Gamma(k, 1/k)` with
//! `k = 1/σ²`, so that `E[N] = 1` and `std(N) = σ`. A noisy image is the
//! element-wise product `I_noisy = I_clean ⊙ N`.

use imgref::{ImgRef, ImgVec};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::plane::{self, Plane};

/// Source of randomness for noise synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NoiseSeed {
    /// Deterministic stream for reproducible fixtures.
    Fixed(u64),
    /// Fresh OS entropy on every call.
    #[default]
    Entropy,
}

impl NoiseSeed {
    fn rng(self) -> StdRng {
        match self {
            Self::Fixed(seed) => StdRng::seed_from_u64(seed),
            Self::Entropy => StdRng::from_entropy(),
        }
    }
}

impl From<Option<u64>> for NoiseSeed {
    fn from(seed: Option<u64>) -> Self {
        seed.map_or(Self::Entropy, Self::Fixed)
    }
}

/// Generate a `width × height` unit-mean multiplicative noise field with
/// standard deviation `sigma_mult`.
///
/// `sigma_mult == 0` yields a field of ones.
pub fn speckle_field(width: usize, height: usize, sigma_mult: f64, seed: NoiseSeed) -> Result<Plane> {
    if !(sigma_mult.is_finite() && sigma_mult >= 0.0) {
        return Err(Error::invalid(
            "sigma_mult",
            format!("must be finite and >= 0, got {sigma_mult}"),
        ));
    }
    plane::ensure_dims(width, height, "speckle field")?;
    let len = width * height;
    if sigma_mult == 0.0 {
        return Ok(ImgVec::new(vec![1.0; len], width, height));
    }

    let shape = 1.0 / (sigma_mult * sigma_mult);
    let gamma = Gamma::new(shape, 1.0 / shape)
        .map_err(|e| Error::invalid("sigma_mult", format!("gamma distribution rejected k={shape}: {e}")))?;

    debug!(width, height, sigma_mult, ?seed, "speckle field");
    let mut rng = seed.rng();
    let pixels: Vec<f64> = (0..len).map(|_| gamma.sample(&mut rng)).collect();
    Ok(ImgVec::new(pixels, width, height))
}

/// Multiply `clean` by a fresh speckle field of level `sigma_mult`.
pub fn apply_speckle(clean: ImgRef<'_, f64>, sigma_mult: f64, seed: NoiseSeed) -> Result<Plane> {
    let field = speckle_field(clean.width(), clean.height(), sigma_mult, seed)?;
    apply_field(clean, field.as_ref())
}

/// Multiply `clean` element-wise by an existing noise field, e.g. one
/// measured from a calibration acquisition.
pub fn apply_field(clean: ImgRef<'_, f64>, field: ImgRef<'_, f64>) -> Result<Plane> {
    plane::ensure_same_shape(clean, field)?;
    plane::ensure_finite(field, "noise field")?;
    let pixels: Vec<f64> = clean
        .pixels()
        .zip(field.pixels())
        .map(|(i, n)| i * n)
        .collect();
    Ok(ImgVec::new(pixels, clean.width(), clean.height()))
}
