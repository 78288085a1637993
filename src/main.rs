use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

mod api;
mod cache;
mod config;
mod live_scores;
mod refresh;

use api::AppState;
use cache::{FixtureCache, QuotaTracker};
use config::{Config, ProviderKind};
use live_scores::{ApiFootball, OpenLigaDb, ScoreProvider, SportApi7};
use refresh::{start_poller, RefreshEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let provider = build_provider(&config)?;
    info!(
        "Provider: {} ({}) | quota {} calls/day | cache TTL {} min",
        provider.name(),
        provider.host(),
        config.daily_call_limit,
        config.cache_ttl_minutes
    );
    if let Some(key) = config.api_key.as_deref().filter(|_| config.provider.needs_api_key()) {
        let prefix: String = key.chars().take(8).collect();
        info!("API key loaded: {}...", prefix);
    }

    let engine = Arc::new(RefreshEngine::new(
        provider,
        FixtureCache::new(),
        QuotaTracker::new(config.daily_call_limit, Utc::now()),
        config.refresh_settings(),
    ));

    // Background poller, stopped through the watch channel on shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll_intervals = config.poll_intervals();
    let poller = start_poller(engine.clone(), poll_intervals, shutdown_rx);

    let app = api::router(AppState {
        engine,
        poll_intervals,
    });
    let addr: SocketAddr = config.listen_addr().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Scores API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, waiting for poller");
    let _ = shutdown_tx.send(true);
    if let Err(e) = poller.await {
        warn!("Poller task ended abnormally: {}", e);
    }

    Ok(())
}

fn build_provider(config: &Config) -> Result<Arc<dyn ScoreProvider>> {
    let key = config.api_key.as_deref().unwrap_or_default();
    let base_url = config.provider_base_url.as_deref();
    let timeout = config.request_timeout();
    let policy = config.status_policy();

    let provider: Arc<dyn ScoreProvider> = match config.provider {
        ProviderKind::Sportapi7 => Arc::new(SportApi7::new(
            key,
            base_url,
            &config.sport,
            timeout,
            policy,
        )?),
        ProviderKind::ApiFootball => Arc::new(ApiFootball::new(key, base_url, timeout, policy)?),
        ProviderKind::Openligadb => {
            Arc::new(OpenLigaDb::new(&config.league, base_url, timeout, policy)?)
        }
    };
    Ok(provider)
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
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
    info!("Shutdown signal received");
}
