//! Augmented Dickey-Fuller test with a constant and one lagged difference,
//! plus the mean-reversion half-life.
//!
//! Regression: `Δs_t = c + γ s_{t-1} + φ Δs_{t-1} + ε_t`. The statistic is the
//! t-ratio of `γ`; p-values use MacKinnon's (1994) response-surface
//! approximation for the constant-only case with one series.

use serde::{Deserialize, Serialize};

use super::distributions::normal_cdf;
use super::ols;
use super::stats::finite;

/// Minimum number of defined values before the test is attempted.
pub const ADF_MIN_SAMPLES: usize = 10;

pub const SIGNIFICANCE: f64 = 0.05;

const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdfResult {
    pub statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub is_stationary: bool,
}

impl AdfResult {
    /// Result reported when there is too little data to run the test.
    pub fn not_enough_data() -> Self {
        Self {
            statistic: Some(0.0),
            p_value: Some(1.0),
            is_stationary: false,
        }
    }

    fn undefined() -> Self {
        Self {
            statistic: None,
            p_value: None,
            is_stationary: false,
        }
    }
}

/// Run the test on the finite values of `series`.
pub fn adf_test(series: &[f64]) -> AdfResult {
    let s: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
    if s.len() < ADF_MIN_SAMPLES {
        return AdfResult::not_enough_data();
    }

    let diffs: Vec<f64> = s.windows(2).map(|w| w[1] - w[0]).collect();

    // Rows t = 2..n-1 of the level series.
    let dy = &diffs[1..];
    let lagged_level = &s[1..s.len() - 1];
    let lagged_diff = &diffs[..diffs.len() - 1];

    let Some(fit) = ols::fit(dy, &[lagged_level, lagged_diff]) else {
        return AdfResult::undefined();
    };

    let Some(statistic) = finite(fit.slope_t(0)) else {
        return AdfResult::undefined();
    };
    let p_value = mackinnon_p_value(statistic);

    AdfResult {
        statistic: Some(statistic),
        p_value: Some(p_value),
        is_stationary: p_value < SIGNIFICANCE,
    }
}

/// Approximate asymptotic p-value of a Dickey-Fuller t-statistic.
pub fn mackinnon_p_value(stat: f64) -> f64 {
    if stat > TAU_MAX {
        return 1.0;
    }
    if stat < TAU_MIN {
        return 0.0;
    }
    let z = if stat <= TAU_STAR {
        polyval(&SMALL_P, stat)
    } else {
        polyval(&LARGE_P, stat)
    };
    normal_cdf(z)
}

/// `c[0] + c[1] x + c[2] x² + ...`
fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Half-life of mean reversion: regress `Δs_t` on `s_{t-1}` and report
/// `-ln 2 / θ`. Undefined unless the decay coefficient `θ` is negative.
pub fn halflife(series: &[f64]) -> Option<f64> {
    let s: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
    if s.len() < 3 {
        return None;
    }
    let lagged = &s[..s.len() - 1];
    let delta: Vec<f64> = s.windows(2).map(|w| w[1] - w[0]).collect();

    let fit = ols::fit(&delta, &[lagged])?;
    let theta = fit.slopes[0];
    if theta.is_nan() || theta >= 0.0 {
        return None;
    }
    finite(-std::f64::consts::LN_2 / theta)
}
