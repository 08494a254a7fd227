//! Samplers for the built-in distributions.
//!
//! All draws go through the caller's stream so a sample is reproducible from
//! its (seed, metric, index) triple.

use super::eval::{EvalError, SampleRng};
use rand::Rng;
use std::f64::consts::PI;

/// z-score bounding a central 90% interval.
pub const Z_90: f64 = 1.644_853_626_951_472_2;

pub fn standard_normal(rng: &mut SampleRng) -> f64 {
    // Box-Muller; u1 in (0, 1] keeps ln finite.
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

pub fn normal(rng: &mut SampleRng, mean: f64, sd: f64) -> Result<f64, EvalError> {
    if sd < 0.0 {
        return Err(invalid("normal", format!("standard deviation {sd} is negative")));
    }
    Ok(mean + sd * standard_normal(rng))
}

/// Normal distribution whose central 90% lies between `low` and `high`.
pub fn normal_ci90(rng: &mut SampleRng, low: f64, high: f64) -> Result<f64, EvalError> {
    if low > high {
        return Err(invalid("to", format!("lower bound {low} exceeds upper bound {high}")));
    }
    let mean = (low + high) / 2.0;
    let sd = (high - low) / (2.0 * Z_90);
    Ok(mean + sd * standard_normal(rng))
}

/// Lognormal distribution whose central 90% lies between `low` and `high`.
pub fn lognormal_ci90(rng: &mut SampleRng, low: f64, high: f64) -> Result<f64, EvalError> {
    if low <= 0.0 {
        return Err(invalid("lognormal", format!("lower bound {low} must be positive")));
    }
    if low > high {
        return Err(invalid("lognormal", format!("lower bound {low} exceeds upper bound {high}")));
    }
    let (ln_lo, ln_hi) = (low.ln(), high.ln());
    let mu = (ln_lo + ln_hi) / 2.0;
    let sigma = (ln_hi - ln_lo) / (2.0 * Z_90);
    Ok((mu + sigma * standard_normal(rng)).exp())
}

pub fn uniform(rng: &mut SampleRng, low: f64, high: f64) -> Result<f64, EvalError> {
    if low > high {
        return Err(invalid("uniform", format!("lower bound {low} exceeds upper bound {high}")));
    }
    Ok(low + (high - low) * rng.random::<f64>())
}

pub fn triangular(rng: &mut SampleRng, low: f64, mode: f64, high: f64) -> Result<f64, EvalError> {
    if !(low <= mode && mode <= high) {
        return Err(invalid("triangular", format!("expected {low} <= {mode} <= {high}")));
    }
    if low == high {
        return Ok(low);
    }
    let u: f64 = rng.random();
    let split = (mode - low) / (high - low);
    Ok(if u < split {
        low + (u * (high - low) * (mode - low)).sqrt()
    } else {
        high - ((1.0 - u) * (high - low) * (high - mode)).sqrt()
    })
}

pub fn bernoulli(rng: &mut SampleRng, p: f64) -> Result<f64, EvalError> {
    if !(0.0..=1.0).contains(&p) {
        return Err(invalid("bernoulli", format!("probability {p} is outside [0, 1]")));
    }
    Ok(if rng.random::<f64>() < p { 1.0 } else { 0.0 })
}

pub fn resample(rng: &mut SampleRng, points: &[f64]) -> f64 {
    match points.len() {
        0 => f64::NAN,
        1 => points[0],
        n => points[rng.random_range(0..n)],
    }
}

fn invalid(func: &'static str, reason: String) -> EvalError {
    EvalError::InvalidArgument { func, reason }
}
