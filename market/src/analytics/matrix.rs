use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::stats::{pearson, simple_returns};
use crate::types::OhlcvBar;

/// Pairwise return correlations, `cells[i][j]` for `symbols[i]` against
/// `symbols[j]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub symbols: Vec<String>,
    pub cells: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.symbols.iter().position(|s| s == a)?;
        let j = self.symbols.iter().position(|s| s == b)?;
        self.cells[i][j]
    }
}

/// Correlation matrix of simple returns.
///
/// Close series are inner-joined on the bucket starts common to every
/// symbol before returns are taken, so each cell is computed over the same
/// rows. Symbols with no bars should be filtered out by the caller.
pub fn correlation_matrix(series: &[(String, Vec<OhlcvBar>)]) -> CorrelationMatrix {
    let mut counts: BTreeMap<u64, usize> = BTreeMap::new();
    for (_, bars) in series {
        for bar in bars {
            *counts.entry(bar.bucket_start_ms).or_default() += 1;
        }
    }
    let common: Vec<u64> = counts
        .into_iter()
        .filter(|(_, c)| *c == series.len())
        .map(|(ts, _)| ts)
        .collect();

    let returns: Vec<Vec<f64>> = series
        .iter()
        .map(|(_, bars)| {
            let by_bucket: BTreeMap<u64, f64> =
                bars.iter().map(|b| (b.bucket_start_ms, b.close)).collect();
            let closes: Vec<f64> = common
                .iter()
                .filter_map(|ts| by_bucket.get(ts).copied())
                .collect();
            simple_returns(&closes)
        })
        .collect();

    let cells = returns
        .iter()
        .map(|ri| returns.iter().map(|rj| pearson(ri, rj)).collect())
        .collect();

    CorrelationMatrix {
        symbols: series.iter().map(|(s, _)| s.clone()).collect(),
        cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(closes: &[(u64, f64)]) -> Vec<OhlcvBar> {
        closes
            .iter()
            .map(|&(ts, c)| OhlcvBar {
                bucket_start_ms: ts,
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn diagonal_is_one_and_matrix_is_symmetric() {
        let a = bars(&[(0, 10.0), (1, 11.0), (2, 10.5), (3, 12.0), (4, 11.0)]);
        let b = bars(&[(0, 20.0), (1, 21.0), (2, 22.5), (3, 22.0), (4, 23.0)]);
        let m = correlation_matrix(&[("A".into(), a), ("B".into(), b)]);

        assert!((m.get("A", "A").unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(m.get("A", "B"), m.get("B", "A"));
        assert!(m.get("A", "B").unwrap().abs() <= 1.0);
        assert_eq!(m.get("A", "C"), None);
    }

    #[test]
    fn only_common_buckets_are_used() {
        // Scaled copies on the shared buckets; B has an extra outlier.
        let a = bars(&[(0, 1.0), (1, 2.0), (2, 1.5), (3, 3.0)]);
        let b = bars(&[(0, 2.0), (1, 4.0), (2, 3.0), (3, 6.0), (9, 1000.0)]);
        let m = correlation_matrix(&[("A".into(), a), ("B".into(), b)]);

        assert!((m.get("A", "B").unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn flat_series_has_undefined_cells() {
        let a = bars(&[(0, 5.0), (1, 5.0), (2, 5.0)]);
        let b = bars(&[(0, 1.0), (1, 2.0), (2, 4.0)]);
        let m = correlation_matrix(&[("A".into(), a), ("B".into(), b)]);

        assert_eq!(m.get("A", "B"), None);
        assert_eq!(m.get("A", "A"), None);
    }
}
