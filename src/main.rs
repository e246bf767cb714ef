//! TradeGate service entry point

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tradegate::api::{create_router, AppState, WsSettings};
use tradegate::clock::{Clock, SystemClock};
use tradegate::config::{AppConfig, LoggingConfig};
use tradegate::counter::{CounterStore, InMemoryCounterStore, RedisCounterStore};
use tradegate::events::{EventBroadcaster, EventPoller};
use tradegate::identity::{IdentityGuard, Sr25519Verifier};
use tradegate::jobs::{PriceReconciler, WhitelistSweeper};
use tradegate::oracle::{PgPriceOracle, PriceOracle};
use tradegate::persistence::{EventSource, PgStore, TradeStore, WhitelistStore};
use tradegate::risk::{LeverageRatchet, RateLimiter};
use tradegate::validator::TradeValidator;

fn init_tracing(cfg: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));
    if cfg.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = AppConfig::load()?;
    init_tracing(&cfg.logging);
    info!("🚀 TradeGate starting: {}", cfg);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Storage
    let store = PgStore::connect(&cfg.postgres.url, cfg.postgres.max_connections)
        .await
        .context("Failed to connect to PostgreSQL")?;
    store
        .ensure_schema()
        .await
        .context("Failed to ensure database schema")?;
    let store = Arc::new(store);
    let trades: Arc<dyn TradeStore> = store.clone();
    let whitelist: Arc<dyn WhitelistStore> = store.clone();
    let registry: Arc<dyn WhitelistStore> = store.clone();
    let events: Arc<dyn EventSource> = store.clone();
    let oracle: Arc<dyn PriceOracle> = Arc::new(PgPriceOracle::new(
        store.pool().clone(),
        cfg.market.chains.clone(),
    ));

    // Counters
    let counters: Arc<dyn CounterStore> = match &cfg.redis.url {
        Some(url) => Arc::new(
            RedisCounterStore::connect(url)
                .await
                .context("Failed to connect to Redis")?,
        ),
        None => {
            info!("No Redis configured, using in-process counters");
            Arc::new(InMemoryCounterStore::new(clock.clone()))
        }
    };

    // Validation path
    let identity = Arc::new(IdentityGuard::new(
        Arc::new(Sr25519Verifier::default()),
        whitelist,
        cfg.whitelist.validator_stake_threshold,
    ));
    let limiter = Arc::new(RateLimiter::new(counters.clone(), cfg.rate_limit_config()));
    let ratchet = LeverageRatchet::new(counters, cfg.ratchet_config());
    let validator = Arc::new(TradeValidator::new(
        identity.clone(),
        limiter.clone(),
        ratchet,
        trades.clone(),
        oracle.clone(),
        clock.clone(),
        cfg.validator_config(),
    ));

    // Background jobs
    let broadcaster = EventBroadcaster::new(cfg.events.channel_capacity);
    Arc::new(PriceReconciler::new(
        trades.clone(),
        oracle.clone(),
        clock.clone(),
        cfg.reconcile_config(),
    ))
    .spawn();
    Arc::new(WhitelistSweeper::new(
        trades.clone(),
        Duration::from_secs(cfg.whitelist.sweep_interval_secs),
    ))
    .spawn();
    Arc::new(EventPoller::new(
        events.clone(),
        broadcaster.clone(),
        clock.as_ref(),
        cfg.event_poller_config(),
    ))
    .spawn();

    let state = Arc::new(AppState {
        validator,
        identity,
        limiter,
        trades,
        registry,
        oracle,
        events,
        broadcaster,
        clock,
        chains: cfg.market.chains.clone(),
        tokens: cfg.market.tokens.clone(),
        ws: WsSettings {
            ping_interval: Duration::from_secs(cfg.events.ping_interval_secs),
            idle_timeout: Duration::from_secs(cfg.events.idle_timeout_secs),
        },
    });

    let app = create_router(state);
    let addr = cfg.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("🌐 Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("👋 TradeGate stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed never
/// resolves, so the other one still stops the server.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, gracefully stopping");
}
