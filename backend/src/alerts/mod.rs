use anyhow::{Result, anyhow};
use async_trait::async_trait;
use market::AlertRule;
use parking_lot::RwLock;
use serde::Serialize;

/// Alert rule storage consumed by the broadcast cycle.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn enabled_rules(&self) -> Result<Vec<AlertRule>>;

    /// Increment the rule's trigger counter and stamp the trigger time.
    async fn record_trigger(&self, alert_id: i64, at_ms: u64) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub rule: AlertRule,
    pub triggered_count: u64,
    pub last_triggered_ms: Option<u64>,
}

/// Process-local alert store seeded from configuration.
#[derive(Default)]
pub struct InMemoryAlertStore {
    records: RwLock<Vec<AlertRecord>>,
}

impl InMemoryAlertStore {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self {
            records: RwLock::new(
                rules
                    .into_iter()
                    .map(|rule| AlertRecord {
                        rule,
                        triggered_count: 0,
                        last_triggered_ms: None,
                    })
                    .collect(),
            ),
        }
    }

    pub fn get(&self, alert_id: i64) -> Option<AlertRecord> {
        self.records
            .read()
            .iter()
            .find(|r| r.rule.id == alert_id)
            .cloned()
    }

    pub fn records(&self) -> Vec<AlertRecord> {
        self.records.read().clone()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn enabled_rules(&self) -> Result<Vec<AlertRule>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.rule.enabled)
            .map(|r| r.rule.clone())
            .collect())
    }

    async fn record_trigger(&self, alert_id: i64, at_ms: u64) -> Result<()> {
        let mut records = self.records.write();
        let rec = records
            .iter_mut()
            .find(|r| r.rule.id == alert_id)
            .ok_or_else(|| anyhow!("unknown alert id {alert_id}"))?;
        rec.triggered_count += 1;
        rec.last_triggered_ms = Some(at_ms);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use market::Comparison;

    use super::*;

    fn rule(id: i64, enabled: bool) -> AlertRule {
        AlertRule {
            id,
            name: format!("r{id}"),
            metric: "zscore".into(),
            operator: Comparison::Gt,
            threshold: 2.0,
            symbol: None,
            symbol2: None,
            enabled,
        }
    }

    #[tokio::test]
    async fn only_enabled_rules_are_listed() {
        let store = InMemoryAlertStore::new(vec![rule(1, true), rule(2, false)]);
        let ids: Vec<i64> = store
            .enabled_rules()
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn trigger_updates_counter_and_timestamp() {
        let store = InMemoryAlertStore::new(vec![rule(1, true)]);
        store.record_trigger(1, 100).await.unwrap();
        store.record_trigger(1, 200).await.unwrap();

        let rec = store.get(1).unwrap();
        assert_eq!(rec.triggered_count, 2);
        assert_eq!(rec.last_triggered_ms, Some(200));

        assert!(store.record_trigger(9, 1).await.is_err());
    }
}
