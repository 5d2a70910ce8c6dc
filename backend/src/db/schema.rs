use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Ticks: append-only. `id` gives insertion order for equal timestamps.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS ticks (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  ts_ms BIGINT NOT NULL,
  symbol TEXT NOT NULL COLLATE NOCASE,
  price REAL NOT NULL,
  size REAL NOT NULL,
  ingested_at REAL NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_ticks_symbol_ts ON ticks(symbol, ts_ms);"#)
        .execute(pool)
        .await?;

    Ok(())
}
