//! Alert rule evaluation against computed analytics.
//!
//! Rules are plain data owned by an external store; this module only decides
//! whether a rule fires for a given set of metric values.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::analytics::PairAnalyticsSnapshot;
use crate::error::MarketError;
use crate::types::{Pair, normalize_symbol};

/// Absolute tolerance used by [`Comparison::Eq`].
pub const EQ_TOLERANCE: f64 = 1e-4;

/// Metric resolved from the latest tick of the rule's `symbol`, not from a pair.
pub const PRICE_METRIC: &str = "price";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
}

impl Comparison {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Gt => value > threshold,
            Comparison::Lt => value < threshold,
            Comparison::Gte => value >= threshold,
            Comparison::Lte => value <= threshold,
            Comparison::Eq => (value - threshold).abs() < EQ_TOLERANCE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Comparison::Gt => "gt",
            Comparison::Lt => "lt",
            Comparison::Gte => "gte",
            Comparison::Lte => "lte",
            Comparison::Eq => "eq",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparison {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gt" => Ok(Comparison::Gt),
            "lt" => Ok(Comparison::Lt),
            "gte" => Ok(Comparison::Gte),
            "lte" => Ok(Comparison::Lte),
            "eq" => Ok(Comparison::Eq),
            _ => Err(MarketError::UnknownOperator(s.to_string())),
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: i64,
    pub name: String,
    pub metric: String,
    pub operator: Comparison,
    pub threshold: f64,

    /// With `symbol2`, restricts the rule to that pair. Alone, restricts it
    /// to pairs containing the symbol (and names the instrument for `price`).
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub symbol2: Option<String>,

    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl AlertRule {
    pub fn applies_to(&self, pair: &Pair) -> bool {
        let first = self.symbol.as_deref().and_then(normalize_symbol);
        let second = self.symbol2.as_deref().and_then(normalize_symbol);
        match (first, second) {
            (Some(a), Some(b)) => {
                (pair.first == a && pair.second == b) || (pair.first == b && pair.second == a)
            }
            (Some(s), None) | (None, Some(s)) => pair.first == s || pair.second == s,
            (None, None) => true,
        }
    }
}

/// Alert produced by a rule that fired this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredAlert {
    pub alert_id: i64,
    pub name: String,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub operator: Comparison,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair: Option<String>,
}

/// Named metric values available to rules. Undefined values are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSet {
    values: BTreeMap<String, f64>,
}

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: Option<f64>) {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.values.insert(name.to_string(), v);
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn from_snapshot(s: &PairAnalyticsSnapshot) -> Self {
        let mut m = Self::new();
        m.insert("zscore", s.current_zscore);
        m.insert("correlation", s.correlation);
        m.insert("hedge_ratio", s.hedge_ratio);
        m.insert("spread", s.current_spread);
        m.insert("volatility", s.volatility1);
        m.insert("volatility2", s.volatility2);
        m.insert("halflife", s.halflife);
        m.insert("adf_statistic", s.adf_statistic);
        m.insert("adf_pvalue", s.adf_pvalue);
        m.insert("r_squared", s.r_squared);
        m.insert("p_value", s.p_value);
        m
    }
}

/// Evaluate one rule. Disabled rules and rules whose metric is absent from
/// `metrics` never fire.
pub fn evaluate_rule(rule: &AlertRule, metrics: &MetricSet) -> Option<TriggeredAlert> {
    if !rule.enabled {
        return None;
    }
    let value = metrics.get(&rule.metric)?;
    rule.operator
        .holds(value, rule.threshold)
        .then(|| TriggeredAlert {
            alert_id: rule.id,
            name: rule.name.clone(),
            metric: rule.metric.clone(),
            value,
            threshold: rule.threshold,
            operator: rule.operator,
            pair: None,
        })
}

/// Evaluate every rule once for a cycle.
///
/// `pairs` are the analysed pairs in configured order; `prices` maps symbols
/// to their latest tick price. A rule fires at most once, against the first
/// matching pair whose metrics satisfy it.
pub fn evaluate_rules(
    rules: &[AlertRule],
    pairs: &[(Pair, MetricSet)],
    prices: &HashMap<String, f64>,
) -> Vec<TriggeredAlert> {
    rules
        .iter()
        .filter(|r| r.enabled)
        .filter_map(|rule| {
            if rule.metric == PRICE_METRIC {
                let symbol = rule.symbol.as_deref().and_then(normalize_symbol)?;
                let mut m = MetricSet::new();
                m.insert(PRICE_METRIC, prices.get(&symbol).copied());
                return evaluate_rule(rule, &m);
            }

            pairs
                .iter()
                .filter(|(pair, _)| rule.applies_to(pair))
                .find_map(|(pair, metrics)| {
                    evaluate_rule(rule, metrics).map(|mut t| {
                        t.pair = Some(pair.id());
                        t
                    })
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: i64, metric: &str, operator: Comparison, threshold: f64) -> AlertRule {
        AlertRule {
            id,
            name: format!("rule-{id}"),
            metric: metric.to_string(),
            operator,
            threshold,
            symbol: None,
            symbol2: None,
            enabled: true,
        }
    }

    fn zscore(v: f64) -> MetricSet {
        let mut m = MetricSet::new();
        m.insert("zscore", Some(v));
        m
    }

    #[test]
    fn zscore_gt_fires_strictly_above_threshold() {
        let r = rule(1, "zscore", Comparison::Gt, 2.0);

        assert!(evaluate_rule(&r, &zscore(2.01)).is_some());
        assert!(evaluate_rule(&r, &zscore(2.0)).is_none());
        assert!(evaluate_rule(&r, &zscore(-3.0)).is_none());
    }

    #[test]
    fn eq_uses_tolerance() {
        let r = rule(1, "zscore", Comparison::Eq, 1.0);
        assert!(evaluate_rule(&r, &zscore(1.00005)).is_some());
        assert!(evaluate_rule(&r, &zscore(1.001)).is_none());
    }

    #[test]
    fn missing_metric_never_fires() {
        let r = rule(1, "halflife", Comparison::Gte, f64::NEG_INFINITY);
        assert!(evaluate_rule(&r, &zscore(5.0)).is_none());

        let mut m = MetricSet::new();
        m.insert("halflife", None);
        m.insert("spread", Some(f64::NAN));
        assert_eq!(m, MetricSet::new());
    }

    #[test]
    fn disabled_rule_never_fires() {
        let mut r = rule(1, "zscore", Comparison::Gt, 0.0);
        r.enabled = false;
        assert!(evaluate_rule(&r, &zscore(5.0)).is_none());
        assert!(evaluate_rules(&[r], &[(Pair::new("A", "B"), zscore(5.0))], &HashMap::new()).is_empty());
    }

    #[test]
    fn unpaired_rule_fires_once_on_first_matching_pair() {
        let r = rule(7, "zscore", Comparison::Gt, 2.0);
        let pairs = vec![
            (Pair::new("A", "B"), zscore(1.0)),
            (Pair::new("C", "D"), zscore(2.5)),
            (Pair::new("E", "F"), zscore(3.0)),
        ];

        let fired = evaluate_rules(&[r], &pairs, &HashMap::new());

        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].pair.as_deref(), Some("C/D"));
        assert_eq!(fired[0].value, 2.5);
    }

    #[test]
    fn paired_rule_only_sees_its_pair() {
        let mut r = rule(3, "zscore", Comparison::Gt, 2.0);
        r.symbol = Some("c".into());
        r.symbol2 = Some("d".into());
        let pairs = vec![
            (Pair::new("A", "B"), zscore(9.0)),
            (Pair::new("C", "D"), zscore(1.0)),
        ];

        assert!(evaluate_rules(&[r], &pairs, &HashMap::new()).is_empty());
    }

    #[test]
    fn paired_rule_matches_either_order() {
        let mut r = rule(4, "zscore", Comparison::Gt, 2.0);
        r.symbol = Some("eth".into());
        r.symbol2 = Some("btc".into());

        assert!(r.applies_to(&Pair::new("BTC", "ETH")));
        assert!(r.applies_to(&Pair::new("ETH", "BTC")));
        assert!(!r.applies_to(&Pair::new("BTC", "SOL")));

        let pairs = vec![(Pair::new("BTC", "ETH"), zscore(3.0))];
        let fired = evaluate_rules(&[r], &pairs, &HashMap::new());
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].pair.as_deref(), Some("BTC/ETH"));
    }

    #[test]
    fn price_rule_reads_latest_tick() {
        let mut r = rule(4, "price", Comparison::Lt, 100.0);
        r.symbol = Some("btcusdt".into());
        let prices = HashMap::from([("BTCUSDT".to_string(), 99.5)]);

        let fired = evaluate_rules(&[r.clone()], &[], &prices);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].value, 99.5);

        r.symbol = None;
        assert!(evaluate_rules(&[r], &[], &prices).is_empty());
    }

    #[test]
    fn rules_deserialize_with_defaults() {
        let r: AlertRule = serde_json::from_str(
            r#"{"id":1,"name":"wide","metric":"zscore","operator":"gte","threshold":2.5}"#,
        )
        .unwrap();
        assert!(r.enabled);
        assert_eq!(r.operator, Comparison::Gte);
        assert_eq!(r.symbol, None);
    }

    #[test]
    fn operator_parsing() {
        assert_eq!("LTE".parse::<Comparison>().unwrap(), Comparison::Lte);
        assert!(matches!(
            "ne".parse::<Comparison>(),
            Err(MarketError::UnknownOperator(_))
        ));
    }
}
