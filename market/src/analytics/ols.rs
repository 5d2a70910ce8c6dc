//! Ordinary least squares with an intercept.
//!
//! Regressors are centered before solving, which keeps the normal equations
//! well conditioned for price-level inputs (BTC at 60k against ETH at 3k).
//! Only slope standard errors are produced; nothing here needs the
//! intercept's.

use super::distributions::student_t_two_sided;

/// Relative size below which a regressor counts as constant.
const DEGENERATE_REL: f64 = 1e-12;

/// Relative pivot size below which the system counts as singular.
const PIVOT_REL: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    pub intercept: f64,
    pub slopes: Vec<f64>,
    /// NaN when there are no residual degrees of freedom.
    pub slope_std_errors: Vec<f64>,
    /// NaN when `y` is constant.
    pub r_squared: f64,
    pub nobs: usize,
    pub df_resid: usize,
}

impl OlsFit {
    pub fn slope_t(&self, i: usize) -> f64 {
        self.slopes[i] / self.slope_std_errors[i]
    }

    /// Two-sided p-value of the i-th slope's t-statistic.
    pub fn slope_p_value(&self, i: usize) -> f64 {
        student_t_two_sided(self.slope_t(i), self.df_resid as f64)
    }
}

/// Fit `y = intercept + Σ slope_i * regressors[i]`.
///
/// Returns `None` for mismatched lengths, non-finite input, too few
/// observations, a constant regressor, or collinear regressors.
pub fn fit(y: &[f64], regressors: &[&[f64]]) -> Option<OlsFit> {
    let n = y.len();
    let k = regressors.len();

    if k == 0 || n < k + 1 || regressors.iter().any(|x| x.len() != n) {
        return None;
    }
    if y
        .iter()
        .chain(regressors.iter().flat_map(|x| x.iter()))
        .any(|v| !v.is_finite())
    {
        return None;
    }

    let nf = n as f64;
    let y_mean = y.iter().sum::<f64>() / nf;
    let x_means: Vec<f64> = regressors
        .iter()
        .map(|x| x.iter().sum::<f64>() / nf)
        .collect();

    let mut sxx = vec![vec![0.0; k]; k];
    let mut sxy = vec![0.0; k];
    for t in 0..n {
        let dy = y[t] - y_mean;
        for i in 0..k {
            let di = regressors[i][t] - x_means[i];
            sxy[i] += di * dy;
            for j in 0..k {
                sxx[i][j] += di * (regressors[j][t] - x_means[j]);
            }
        }
    }

    for (i, x) in regressors.iter().enumerate() {
        let scale = x.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        if sxx[i][i] <= nf * (DEGENERATE_REL * scale).powi(2) {
            return None;
        }
    }

    let inv = invert(&sxx)?;

    let slopes: Vec<f64> = (0..k)
        .map(|i| (0..k).map(|j| inv[i][j] * sxy[j]).sum())
        .collect();
    let intercept = y_mean
        - slopes
            .iter()
            .zip(&x_means)
            .map(|(b, m)| b * m)
            .sum::<f64>();

    let mut ssr = 0.0;
    let mut sst = 0.0;
    for t in 0..n {
        let fitted = intercept
            + slopes
                .iter()
                .zip(regressors)
                .map(|(b, x)| b * x[t])
                .sum::<f64>();
        ssr += (y[t] - fitted).powi(2);
        sst += (y[t] - y_mean).powi(2);
    }

    let df_resid = n - k - 1;
    let sigma2 = if df_resid > 0 {
        ssr / df_resid as f64
    } else {
        f64::NAN
    };
    let r_squared = if sst > 0.0 { 1.0 - ssr / sst } else { f64::NAN };
    let slope_std_errors = (0..k).map(|i| (sigma2 * inv[i][i]).sqrt()).collect();

    Some(OlsFit {
        intercept,
        slopes,
        slope_std_errors,
        r_squared,
        nobs: n,
        df_resid,
    })
}

/// Gauss-Jordan inverse with partial pivoting.
fn invert(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let k = a.len();
    let max_diag = (0..k).fold(0.0_f64, |m, i| m.max(a[i][i].abs()));
    if max_diag == 0.0 {
        return None;
    }

    let mut m: Vec<Vec<f64>> = a.to_vec();
    let mut inv: Vec<Vec<f64>> = (0..k)
        .map(|i| (0..k).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..k {
        let pivot_row = (col..k).max_by(|&r1, &r2| m[r1][col].abs().total_cmp(&m[r2][col].abs()))?;
        if m[pivot_row][col].abs() <= PIVOT_REL * max_diag {
            return None;
        }
        m.swap(col, pivot_row);
        inv.swap(col, pivot_row);

        let p = m[col][col];
        for j in 0..k {
            m[col][j] /= p;
            inv[col][j] /= p;
        }

        for row in 0..k {
            if row == col {
                continue;
            }
            let factor = m[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..k {
                m[row][j] -= factor * m[col][j];
                inv[row][j] -= factor * inv[col][j];
            }
        }
    }

    Some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_exact_line() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y: Vec<f64> = x.iter().map(|v| 3.0 + 2.0 * v).collect();

        let f = fit(&y, &[&x]).unwrap();

        assert!((f.slopes[0] - 2.0).abs() < 1e-12);
        assert!((f.intercept - 3.0).abs() < 1e-12);
        assert!((f.r_squared - 1.0).abs() < 1e-12);
        assert_eq!(f.df_resid, 3);
    }

    #[test]
    fn noisy_fit_has_finite_p_value() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = [2.1, 3.9, 6.2, 7.8, 10.1, 12.2];

        let f = fit(&y, &[&x]).unwrap();

        assert!((f.slopes[0] - 2.0).abs() < 0.1);
        let p = f.slope_p_value(0);
        assert!(p.is_finite() && p < 1e-4, "p = {p}");
    }

    #[test]
    fn two_regressors() {
        let x1 = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let x2 = [2.0, 1.0, 4.0, 3.0, 6.0, 5.0, 8.0];
        let y: Vec<f64> = x1
            .iter()
            .zip(&x2)
            .map(|(a, b)| 1.0 + 0.5 * a - 2.0 * b)
            .collect();

        let f = fit(&y, &[&x1, &x2]).unwrap();

        assert!((f.slopes[0] - 0.5).abs() < 1e-10);
        assert!((f.slopes[1] + 2.0).abs() < 1e-10);
        assert!((f.intercept - 1.0).abs() < 1e-10);
    }

    #[test]
    fn constant_regressor_is_singular() {
        let x = [0.1, 0.1, 0.1, 0.1];
        let y = [1.0, 2.0, 3.0, 4.0];
        assert!(fit(&y, &[&x]).is_none());

        let zeros = [0.0; 4];
        assert!(fit(&y, &[&zeros]).is_none());
    }

    #[test]
    fn collinear_regressors_are_singular() {
        let x1 = [1.0, 2.0, 3.0, 4.0, 5.0];
        let x2: Vec<f64> = x1.iter().map(|v| v * 2.0).collect();
        let y = [1.0, 3.0, 2.0, 5.0, 4.0];
        assert!(fit(&y, &[&x1, &x2]).is_none());
    }

    #[test]
    fn exactly_determined_fit_has_no_std_error() {
        let f = fit(&[1.0, 3.0], &[&[0.0, 1.0]]).unwrap();
        assert!((f.slopes[0] - 2.0).abs() < 1e-12);
        assert_eq!(f.df_resid, 0);
        assert!(f.slope_std_errors[0].is_nan());
        assert!(f.slope_p_value(0).is_nan());
    }

    #[test]
    fn rejects_bad_shapes_and_values() {
        assert!(fit(&[1.0, 2.0, 3.0], &[&[1.0, 2.0]]).is_none());
        assert!(fit(&[1.0, f64::NAN, 3.0], &[&[1.0, 2.0, 3.0]]).is_none());
        assert!(fit(&[1.0], &[&[1.0]]).is_none());
    }
}
