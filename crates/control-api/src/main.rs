use std::sync::Arc;

use control_api::{router, AppState};
use market_data_aggregator::DefaultMarketAggregator;
use market_data_client::MarketDataClient;
use progress_bus::ProgressBus;
use scan_core::ScanConfig;
use scan_orchestrator::ScanOrchestrator;
use scan_state_tracker::ScanStateTracker;
use stock_data_store::StockDataStore;
use strategy_engine::StrategyEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    let config = ScanConfig::from_env();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://scan.db".to_string());
    let store = Arc::new(StockDataStore::connect(&database_url).await?);

    let base_url = std::env::var("MARKET_DATA_BASE_URL")
        .unwrap_or_else(|_| "https://api.marketdata.example".to_string());
    let api_key = std::env::var("MARKET_DATA_API_KEY").unwrap_or_default();
    let market_client = Arc::new(MarketDataClient::new(base_url, api_key));

    let aggregator = Arc::new(DefaultMarketAggregator::new(
        market_client.clone(),
        market_client.clone(),
        store.clone(),
        config.strategy.min_expiry_days,
        config.strategy.max_expiry_days,
    ));

    let discovery = if config.options_discovery.enabled {
        Some(market_client.clone() as Arc<dyn scan_core::OptionsDiscoveryService>)
    } else {
        None
    };

    let engine = StrategyEngine::with_default_strategies(&config.strategy);
    let tracker = Arc::new(ScanStateTracker::new());
    let bus = ProgressBus::new();

    let orchestrator = ScanOrchestrator::new(
        config,
        aggregator,
        discovery,
        engine,
        store,
        tracker,
        bus,
    );
    orchestrator.start();

    let app = router(AppState { orchestrator });

    let addr = std::env::var("CONTROL_API_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "control-api listening");
    axum::serve(listener, app).await?;

    Ok(())
}
