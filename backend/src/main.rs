use std::sync::Arc;
use std::time::Duration;

use backend::{
    alerts::InMemoryAlertStore,
    broadcast::BroadcastHub,
    collector::{Collector, feed::BinanceTradeFeed},
    config::AppConfig,
    db::Db,
    error::ServiceError,
    logger::init_tracing,
    metrics::counters::Counters,
    service::AnalyticsService,
    store::{SqlxTickStore, TickStore},
    ws_server,
};
use tokio::net::TcpListener;
use tracing::Instrument;

/// Initializes DB, runs migrations and constructs the tick store.
async fn init_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn TickStore>> {
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    Ok(Arc::new(SqlxTickStore::new(db.pool)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("Starting pairwatch backend...");

    let cfg = AppConfig::from_env()?;
    let counters = Counters::default();

    let store = init_store(&cfg).await?;

    let feed = Arc::new(BinanceTradeFeed::new(
        cfg.feed_ws_url.clone(),
        Duration::from_millis(cfg.feed_retry_ms),
    ));
    let collector = Arc::new(Collector::new(
        store.clone(),
        feed,
        cfg.collector(),
        counters.clone(),
    ));

    let alerts = Arc::new(InMemoryAlertStore::new(cfg.alert_rules.clone()));
    let service = Arc::new(AnalyticsService::new(
        collector,
        store,
        alerts,
        cfg.service(),
    ));
    let hub = BroadcastHub::new(service.clone(), cfg.broadcast(), counters.clone());

    if !cfg.stream_symbols.is_empty() {
        service.start_stream(&cfg.stream_symbols).await?;
    }

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    tracing::info!(addr = %cfg.listen_addr, "analytics websocket listening");

    let server = tokio::spawn(
        ws_server::serve(listener, hub.clone()).instrument(tracing::info_span!("ws_server")),
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    server.abort();
    hub.shutdown().await;

    match service.stop_stream().await {
        Ok(()) | Err(ServiceError::NotRunning) => {}
        Err(e) => tracing::error!(error = %e, "final flush failed"),
    }

    tracing::info!(counters = ?counters.snapshot(), "final counters");
    Ok(())
}
