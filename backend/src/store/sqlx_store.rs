use anyhow::{Context, anyhow};
use async_trait::async_trait;
use market::{Tick, TimeRange};
use sqlx::{AnyPool, Row};

use crate::store::{StoreStats, TickStore};

/// SQLx-backed implementation of TickStore.
/// Responsible only for persistence and row mapping.
pub struct SqlxTickStore {
    pool: AnyPool,
}

impl SqlxTickStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TickStore for SqlxTickStore {
    async fn append(&self, ticks: &[Tick]) -> anyhow::Result<()> {
        if ticks.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.context("begin tick batch")?;
        for t in ticks {
            sqlx::query(
                r#"
INSERT INTO ticks (ts_ms, symbol, price, size, ingested_at)
VALUES (?, ?, ?, ?, ?);
"#,
            )
            .bind(u64_to_i64(t.ts_ms)?)
            .bind(t.symbol.clone())
            .bind(t.price)
            .bind(t.size)
            .bind(t.ingested_at)
            .execute(&mut *tx)
            .await
            .context("insert tick")?;
        }
        tx.commit().await.context("commit tick batch")?;

        Ok(())
    }

    async fn query(
        &self,
        symbol: &str,
        range: TimeRange,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<Tick>> {
        let start = u64_to_i64(range.start_ms.unwrap_or(0))?;
        let end = range.end_ms.map(u64_to_i64).transpose()?.unwrap_or(i64::MAX);
        // SQLite treats a negative LIMIT as "no limit".
        let limit = match limit {
            Some(n) => i64::try_from(n).unwrap_or(i64::MAX),
            None => -1,
        };

        // Newest first so LIMIT keeps the most recent rows; reversed below.
        let rows = sqlx::query(
            r#"
SELECT ts_ms, symbol, price, size, ingested_at
FROM ticks
WHERE symbol = ? AND price > 0 AND ts_ms >= ? AND ts_ms <= ?
ORDER BY ts_ms DESC, id DESC
LIMIT ?;
"#,
        )
        .bind(symbol.trim().to_string())
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("query ticks")?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows.iter().rev() {
            match row_to_tick(r) {
                Ok(t) => out.push(t),
                Err(e) => {
                    // poison-row resilience: skip but don't fail the query
                    tracing::warn!(error = %e, "skipping malformed tick row");
                }
            }
        }

        Ok(out)
    }

    async fn stats(&self) -> anyhow::Result<StoreStats> {
        let total: i64 = sqlx::query(r#"SELECT COUNT(*) AS n FROM ticks;"#)
            .fetch_one(&self.pool)
            .await?
            .get("n");

        let rows = sqlx::query(
            r#"SELECT UPPER(symbol) AS symbol, COUNT(*) AS n FROM ticks GROUP BY UPPER(symbol);"#,
        )
        .fetch_all(&self.pool)
        .await?;
        let mut by_symbol = std::collections::BTreeMap::new();
        for r in rows {
            by_symbol.insert(r.get::<String, _>("symbol"), i64_to_u64(r.get("n"))?);
        }

        let latest = sqlx::query(
            r#"
SELECT ts_ms, symbol, price, size, ingested_at
FROM ticks
ORDER BY id DESC
LIMIT 1;
"#,
        )
        .fetch_optional(&self.pool)
        .await?
        .map(|r| row_to_tick(&r))
        .transpose()?;

        Ok(StoreStats {
            total_ticks: i64_to_u64(total)?,
            by_symbol,
            latest,
        })
    }

    async fn clear(&self) -> anyhow::Result<u64> {
        let res = sqlx::query(r#"DELETE FROM ticks;"#)
            .execute(&self.pool)
            .await
            .context("clear ticks")?;
        Ok(res.rows_affected())
    }
}

/* =========================
Row mapping + conversions
========================= */

fn row_to_tick(r: &sqlx::any::AnyRow) -> anyhow::Result<Tick> {
    let ts_ms = i64_to_u64(r.try_get("ts_ms")?)?;
    let symbol: String = r.try_get("symbol")?;

    Ok(Tick::new(
        ts_ms,
        &symbol,
        r.try_get::<f64, _>("price")?,
        r.try_get::<f64, _>("size")?,
        r.try_get::<f64, _>("ingested_at")?,
    ))
}

fn i64_to_u64(v: i64) -> anyhow::Result<u64> {
    if v < 0 {
        return Err(anyhow!("negative i64 where u64 expected: {v}"));
    }
    Ok(v as u64)
}

fn u64_to_i64(v: u64) -> anyhow::Result<i64> {
    if v > i64::MAX as u64 {
        return Err(anyhow!("u64 too large for i64: {v}"));
    }
    Ok(v as i64)
}
