use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use uuid::Uuid;

use backend::db::schema;
use backend::store::{SqlxTickStore, TickStore};
use market::{Tick, TimeRange};

/// Isolated in-memory DB per test.
/// Unique name prevents test interference during parallel execution.
/// `cache=shared` allows multiple connections within the same pool to see the same in-memory DB.
async fn setup_db() -> AnyPool {
    sqlx::any::install_default_drivers();

    let db_name = Uuid::new_v4().to_string();
    let conn = format!("sqlite:file:{}?mode=memory&cache=shared", db_name);

    let pool = AnyPoolOptions::new()
        .max_connections(5)
        .connect(&conn)
        .await
        .expect("connect sqlite memory db");

    schema::migrate(&pool).await.expect("migrate");
    pool
}

fn tick(ts_ms: u64, symbol: &str, price: f64) -> Tick {
    Tick::new(ts_ms, symbol, price, 1.0, 0.5)
}

#[tokio::test]
async fn append_then_query_is_ascending_and_filtered() {
    let pool = setup_db().await;
    let store = SqlxTickStore::new(pool.clone());

    store
        .append(&[
            tick(3_000, "BTCUSDT", 101.0),
            tick(1_000, "BTCUSDT", 100.0),
            tick(2_000, "ETHUSDT", 2_000.0),
            tick(2_500, "BTCUSDT", 0.0),
            tick(2_600, "BTCUSDT", -4.0),
        ])
        .await
        .unwrap();

    let got = store
        .query("btcusdt", TimeRange::all(), None)
        .await
        .unwrap();

    let ts: Vec<u64> = got.iter().map(|t| t.ts_ms).collect();
    assert_eq!(ts, vec![1_000, 3_000]);
    assert_eq!(got[0].symbol, "BTCUSDT");
    assert_eq!(got[0].ingested_at, 0.5);
}

#[tokio::test]
async fn symbol_match_is_case_insensitive() {
    let pool = setup_db().await;
    let store = SqlxTickStore::new(pool.clone());

    sqlx::query(
        r#"INSERT INTO ticks (ts_ms, symbol, price, size, ingested_at) VALUES (5, 'btcusdt', 10.0, 1.0, 0.0)"#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let got = store.query("BtcUsdt", TimeRange::all(), None).await.unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].symbol, "BTCUSDT");
}

#[tokio::test]
async fn range_bounds_are_inclusive() {
    let pool = setup_db().await;
    let store = SqlxTickStore::new(pool);

    let ticks: Vec<Tick> = (1..=5).map(|i| tick(i * 1_000, "A", i as f64)).collect();
    store.append(&ticks).await.unwrap();

    let got = store
        .query("A", TimeRange::between(2_000, 4_000), None)
        .await
        .unwrap();
    let ts: Vec<u64> = got.iter().map(|t| t.ts_ms).collect();
    assert_eq!(ts, vec![2_000, 3_000, 4_000]);

    let open_start = TimeRange {
        start_ms: None,
        end_ms: Some(1_000),
    };
    assert_eq!(store.query("A", open_start, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn limit_keeps_most_recent_in_ascending_order() {
    let pool = setup_db().await;
    let store = SqlxTickStore::new(pool);

    // Two ticks share ts 3000; insertion order breaks the tie.
    store
        .append(&[
            tick(1_000, "A", 1.0),
            tick(2_000, "A", 2.0),
            tick(3_000, "A", 3.0),
            tick(3_000, "A", 3.5),
        ])
        .await
        .unwrap();

    let got = store.query("A", TimeRange::all(), Some(3)).await.unwrap();
    let prices: Vec<f64> = got.iter().map(|t| t.price).collect();
    assert_eq!(prices, vec![2.0, 3.0, 3.5]);
}

#[tokio::test]
async fn empty_append_is_noop() {
    let pool = setup_db().await;
    let store = SqlxTickStore::new(pool);

    store.append(&[]).await.unwrap();
    assert_eq!(store.stats().await.unwrap().total_ticks, 0);
}

#[tokio::test]
async fn stats_and_clear() {
    let pool = setup_db().await;
    let store = SqlxTickStore::new(pool);

    store
        .append(&[
            tick(1, "A", 1.0),
            tick(2, "A", 0.0),
            tick(3, "B", 2.0),
        ])
        .await
        .unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_ticks, 3);
    assert_eq!(stats.by_symbol.get("A"), Some(&2));
    assert_eq!(stats.by_symbol.get("B"), Some(&1));
    assert_eq!(stats.latest.unwrap().symbol, "B");

    assert_eq!(store.clear().await.unwrap(), 3);
    assert_eq!(store.stats().await.unwrap().total_ticks, 0);
    assert!(store.query("A", TimeRange::all(), None).await.unwrap().is_empty());
}
