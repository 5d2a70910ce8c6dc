//! Pair analytics engine.
//!
//! Inputs are two bar series; their closes are inner-joined on bucket start
//! before any statistic is computed. Every numeric output is an `Option`:
//! undefined values (division by zero, too few samples, singular
//! regressions) are `None`, never NaN or infinity.

pub mod adf;
pub mod distributions;
pub mod matrix;
pub mod ols;
pub mod stats;

use serde::{Deserialize, Serialize};

use crate::error::MarketError;
use crate::rolling_window::DEFAULT_WINDOW;
use crate::types::{OhlcvBar, Pair};

pub use adf::{AdfResult, adf_test, halflife};
pub use matrix::{CorrelationMatrix, correlation_matrix};
use stats::{finite, log_returns, pearson, rolling_volatility, rolling_zscore, spread};

pub const MIN_ALIGNED_POINTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyticsParams {
    pub zscore_window: usize,
    pub volatility_window: usize,
    pub min_aligned: usize,
}

impl Default for AnalyticsParams {
    fn default() -> Self {
        Self {
            zscore_window: DEFAULT_WINDOW,
            volatility_window: DEFAULT_WINDOW,
            min_aligned: MIN_ALIGNED_POINTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairAnalyticsSnapshot {
    pub symbol1: String,
    pub symbol2: String,
    pub correlation: Option<f64>,
    pub hedge_ratio: Option<f64>,
    pub alpha: Option<f64>,
    pub r_squared: Option<f64>,
    pub p_value: Option<f64>,
    pub current_spread: Option<f64>,
    pub current_zscore: Option<f64>,
    pub adf_statistic: Option<f64>,
    pub adf_pvalue: Option<f64>,
    pub is_stationary: bool,
    pub volatility1: Option<f64>,
    pub volatility2: Option<f64>,
    pub halflife: Option<f64>,
    pub data_points: usize,
}

impl PairAnalyticsSnapshot {
    fn undefined(pair: &Pair, data_points: usize) -> Self {
        Self {
            symbol1: pair.first.clone(),
            symbol2: pair.second.clone(),
            correlation: None,
            hedge_ratio: None,
            alpha: None,
            r_squared: None,
            p_value: None,
            current_spread: None,
            current_zscore: None,
            adf_statistic: None,
            adf_pvalue: None,
            is_stationary: false,
            volatility1: None,
            volatility2: None,
            halflife: None,
            data_points,
        }
    }
}

/// Result of regressing `priceA = alpha + beta * priceB`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HedgeFit {
    pub beta: f64,
    pub alpha: f64,
    pub r_squared: Option<f64>,
    pub p_value: Option<f64>,
}

impl HedgeFit {
    /// Reported for fewer than two points: no hedge, no signal.
    pub fn no_signal() -> Self {
        Self {
            beta: 0.0,
            alpha: 0.0,
            r_squared: Some(0.0),
            p_value: Some(1.0),
        }
    }
}

/// OLS hedge ratio of `y` on `x` over rows where both are finite.
///
/// `None` means the regression is singular (e.g. `x` is constant).
pub fn hedge_ratio(y: &[f64], x: &[f64]) -> Option<HedgeFit> {
    let (y, x): (Vec<f64>, Vec<f64>) = y
        .iter()
        .zip(x)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .unzip();

    if y.len() < 2 {
        return Some(HedgeFit::no_signal());
    }

    let fit = ols::fit(&y, &[&x])?;
    Some(HedgeFit {
        beta: fit.slopes[0],
        alpha: fit.intercept,
        r_squared: finite(fit.r_squared),
        p_value: finite(fit.slope_p_value(0)),
    })
}

/// Close prices of two bar series joined on bucket start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedCloses {
    pub bucket_start_ms: Vec<u64>,
    pub first: Vec<f64>,
    pub second: Vec<f64>,
}

impl AlignedCloses {
    pub fn len(&self) -> usize {
        self.bucket_start_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bucket_start_ms.is_empty()
    }
}

/// Inner join of two bucket-ascending bar series.
pub fn align_closes(a: &[OhlcvBar], b: &[OhlcvBar]) -> AlignedCloses {
    let mut out = AlignedCloses::default();
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        let (ta, tb) = (a[i].bucket_start_ms, b[j].bucket_start_ms);
        if ta == tb {
            out.bucket_start_ms.push(ta);
            out.first.push(a[i].close);
            out.second.push(b[j].close);
            i += 1;
            j += 1;
        } else if ta < tb {
            i += 1;
        } else {
            j += 1;
        }
    }

    out
}

/// Full pair snapshot for `pair` over the given bar series.
pub fn analyze_pair(
    pair: &Pair,
    bars1: &[OhlcvBar],
    bars2: &[OhlcvBar],
    params: AnalyticsParams,
) -> Result<PairAnalyticsSnapshot, MarketError> {
    let aligned = align_closes(bars1, bars2);
    if aligned.len() < params.min_aligned {
        return Err(MarketError::InsufficientData {
            aligned: aligned.len(),
            required: params.min_aligned,
        });
    }

    let mut snap = PairAnalyticsSnapshot::undefined(pair, aligned.len());

    let returns1 = log_returns(&aligned.first);
    let returns2 = log_returns(&aligned.second);
    snap.correlation = pearson(&returns1, &returns2);
    snap.volatility1 = last_defined(&rolling_volatility(&returns1, params.volatility_window));
    snap.volatility2 = last_defined(&rolling_volatility(&returns2, params.volatility_window));

    let Some(hedge) = hedge_ratio(&aligned.first, &aligned.second) else {
        return Ok(snap);
    };
    snap.hedge_ratio = finite(hedge.beta);
    snap.alpha = finite(hedge.alpha);
    snap.r_squared = hedge.r_squared;
    snap.p_value = hedge.p_value;

    let spread = spread(&aligned.first, &aligned.second, hedge.beta);
    snap.current_spread = spread.last().copied().and_then(finite);
    snap.current_zscore = last_defined(&rolling_zscore(&spread, params.zscore_window));

    let adf = adf_test(&spread);
    snap.adf_statistic = adf.statistic;
    snap.adf_pvalue = adf.p_value;
    snap.is_stationary = adf.is_stationary;
    snap.halflife = halflife(&spread);

    Ok(snap)
}

/// Value at the end of a rolling series, if it is defined.
fn last_defined(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}
