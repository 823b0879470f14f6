use anyhow::{Context, Result};
use ltp_cache::api;
use ltp_cache::config::{Config, EnvConfig};
use ltp_cache::data::kraken::KrakenClient;
use ltp_cache::monitoring;
use ltp_cache::PriceService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let env_config = EnvConfig::load();
    let mut config = Config::load(env_config.config_path())?;
    config.apply_env(&env_config);

    monitoring::logging::init(&config.logging.level);

    tracing::info!("LTP service starting...");
    tracing::info!(
        "Kraken: {} (retries: {}, backoff base: {}ms)",
        config.upstream.base_url,
        config.upstream.retries,
        config.upstream.backoff_base_ms
    );

    let kraken = KrakenClient::new(
        &config.upstream.base_url,
        config.upstream.timeout(),
        config.upstream.retry_policy(),
    )
    .context("Failed to build Kraken HTTP client")?;
    let service = Arc::new(PriceService::new(Arc::new(kraken), config.cache.ttl()));
    tracing::info!("Cache TTL: {:?}", service.cache_ttl());
    let app = api::router(api::AppState::new(service, config.server.request_timeout()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Starting HTTP server on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    tracing::info!("Shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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
}
