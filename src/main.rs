use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod api;
mod auth;
mod config;
mod error;
mod events;
mod ledger;
mod matching;
mod metrics;
mod models;
mod orderbook;
mod risk;
mod store;
mod utils;

use crate::config::AppConfig;
use crate::events::EventBus;
use crate::ledger::Ledger;
use crate::matching::MatchingEngine;
use crate::store::{RedisStore, RedisStoreConfig, Store};

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn Store>,
    pub ledger: Arc<Ledger>,
    pub matching: Arc<MatchingEngine>,
    pub events: Arc<EventBus>,
    pub default_account_id: Uuid,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;
    tracing::info!(environment = %config.environment, port = config.port, "starting equity matching engine");

    let prometheus_handle = metrics::init_metrics();

    let redis_config = RedisStoreConfig {
        url: config.redis_url.clone(),
        ..Default::default()
    };
    let store: Arc<dyn Store> = match RedisStore::connect(redis_config).await {
        Ok(store) => {
            tracing::info!("connected to redis state store");
            Arc::new(store)
        }
        Err(err) => {
            tracing::warn!(error = %err, "redis unavailable, falling back to in-memory store");
            Arc::new(store::MemoryStore::new())
        }
    };

    let ledger = Arc::new(Ledger::new(store.clone()));
    ledger.seed_if_empty().await?;

    let default_account_id = ledger
        .list_accounts()
        .await?
        .first()
        .map(|a| a.id)
        .unwrap_or_else(Uuid::new_v4);

    let events = Arc::new(EventBus::new());
    let config_for_engine = Arc::new(config.clone());
    let matching = Arc::new(MatchingEngine::new(
        store.clone(),
        ledger.clone(),
        config_for_engine,
        events.clone(),
    ));

    let port = config.port;
    let state = Arc::new(AppState {
        config,
        store,
        ledger,
        matching,
        events,
        default_account_id,
    });

    // Continuous matching driver: cleanup sweep plus a per-symbol match pass
    // every cycle, so pending market orders retry as liquidity arrives.
    let driver_matching = state.matching.clone();
    let cycle_interval = std::time::Duration::from_millis(state.config.match_cycle_interval_ms);
    tokio::spawn(async move {
        driver_matching.run(cycle_interval).await;
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(move || render_metrics(prometheus_handle.clone())))
        .merge(api::routes::create_router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from_str(&format!("0.0.0.0:{port}"))?;
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn render_metrics(handle: metrics_exporter_prometheus::PrometheusHandle) -> String {
    handle.render()
}
