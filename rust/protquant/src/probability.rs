//! Density and detection curves shared by the likelihood model.
//!
//! Everything in here works on log10 intensities / log10 ratios.

use statrs::distribution::{
    Continuous,
    Gamma,
};
use statrs::function::logistic::logistic;
use std::f64::consts::FRAC_PI_2;

use crate::errors::{
    ProtQuantError,
    Result,
};

/// Smallest positive representable `f64` (subnormal).
///
/// Probabilities are floored to this before any `ln`, so an "impossible"
/// event only ever contributes a very large negative log-likelihood.
pub const SMALLEST_POSITIVE: f64 = 5e-324;

#[inline]
pub fn floor_probability(p: f64) -> f64 {
    // `f64::max` ignores NaN, so NaN has to be passed through explicitly.
    if p.is_nan() { p } else { p.max(SMALLEST_POSITIVE) }
}

/// Probability that a feature with true log10 intensity `x` is not detected.
///
/// `1 - logistic((x - mu) / sigma)`, floored above zero.
///
/// ```
/// use protquant::probability::p_missing;
///
/// // At the detection midpoint it is a coin flip.
/// assert!((p_missing(5.0, 5.0, 0.5) - 0.5).abs() < 1e-12);
/// // Very intense features are almost never missing.
/// assert!(p_missing(10.0, 5.0, 0.5) < 1e-4);
/// ```
#[inline]
pub fn p_missing(x: f64, mu: f64, sigma: f64) -> f64 {
    floor_probability(1.0 - logistic((x - mu) / sigma))
}

/// Hyperbolic secant density, the noise model for log10 deviations.
///
/// Heavier tailed than a gaussian with the same scale.
#[inline]
pub fn hypsec_density(delta: f64, mu: f64, sigma: f64) -> f64 {
    0.5 / sigma / (FRAC_PI_2 * (delta - mu) / sigma).cosh()
}

/// Gamma density with `shape` and `scale`, evaluated at every `x`.
pub fn gamma_densities(xs: &[f64], shape: f64, scale: f64) -> Result<Vec<f64>> {
    if !(scale > 0.0) {
        return Err(ProtQuantError::config(format!(
            "gamma scale must be > 0, got {}",
            scale
        )));
    }
    let dist = Gamma::new(shape, 1.0 / scale).map_err(|e| {
        ProtQuantError::config(format!(
            "invalid gamma prior (shape {}, scale {}): {}",
            shape, scale, e
        ))
    })?;
    Ok(xs.iter().map(|&x| dist.pdf(x)).collect())
}
