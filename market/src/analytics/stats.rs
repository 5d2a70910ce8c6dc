use crate::rolling_window::RollingWindow;

/// Map NaN and infinities to `None`.
pub fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// `ln(p_t / p_{t-1})`; one element shorter than `prices`.
pub fn log_returns(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect()
}

/// `p_t / p_{t-1} - 1`; one element shorter than `prices`.
pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

pub fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    finite(xs.iter().sum::<f64>() / xs.len() as f64)
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_std(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let m = mean(xs)?;
    let ss: f64 = xs.iter().map(|v| (v - m).powi(2)).sum();
    finite((ss / (xs.len() - 1) as f64).sqrt())
}

/// Pearson correlation over the rows where both sides are finite.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let rows: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .collect();
    if rows.len() < 2 {
        return None;
    }

    let n = rows.len() as f64;
    let mx = rows.iter().map(|r| r.0).sum::<f64>() / n;
    let my = rows.iter().map(|r| r.1).sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in &rows {
        let dx = x - mx;
        let dy = y - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    finite(sxy / (sxx * syy).sqrt()).map(|r| r.clamp(-1.0, 1.0))
}

/// `y - beta * x`, pointwise.
pub fn spread(y: &[f64], x: &[f64], beta: f64) -> Vec<f64> {
    y.iter().zip(x).map(|(a, b)| a - beta * b).collect()
}

/// `(s_t - mean) / std` over a trailing window; `None` for the first
/// `window - 1` points and wherever the window has zero dispersion.
pub fn rolling_zscore(series: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut w = RollingWindow::new(window);
    series
        .iter()
        .map(|&v| {
            w.push(v);
            let mean = w.mean()?;
            let std = w.std()?;
            finite((v - mean) / std)
        })
        .collect()
}

/// Rolling standard deviation of returns scaled by `sqrt(window)`.
pub fn rolling_volatility(returns: &[f64], window: usize) -> Vec<Option<f64>> {
    let scale = (window.max(1) as f64).sqrt();
    let mut w = RollingWindow::new(window);
    returns
        .iter()
        .map(|&r| {
            w.push(r);
            finite(w.std()? * scale)
        })
        .collect()
}
