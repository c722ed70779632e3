use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;

use trailing_profit::api::{BinanceClient, RateLimitConfig, RateLimiter};
use trailing_profit::core::{logging, Config};
use trailing_profit::storage::{PositionDatabase, PositionStore};
use trailing_profit::trailing::{PollingCoordinator, TokioSleeper};

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = Config::load().context("failed to load configuration")?;

    let _log_guard = logging::init_logging(&config.logging);

    tracing::info!("Trailing profit service starting...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(
        PositionDatabase::connect(&config.database)
            .await
            .context("failed to open position database")?,
    );

    // The session runs on the account user's own keys when they have them
    match store.fetch_user(config.trailing.account_user_id).await {
        Ok(user) => {
            tracing::info!("Trading session for user {} ({})", user.id, user.name);
            config.exchange = config
                .exchange
                .with_credentials(user.api_key.as_deref(), user.api_secret.as_deref());
        }
        Err(e) => tracing::warn!(
            "Could not load user {}, using configured credentials: {}",
            config.trailing.account_user_id,
            e
        ),
    }

    config.validate().context("invalid configuration")?;

    let limiter = Arc::new(RateLimiter::new(RateLimitConfig::per_minute(
        config.exchange.max_weight_per_minute,
    )));
    let exchange = Arc::new(BinanceClient::new(config.exchange.clone(), limiter)?);

    let coordinator =
        PollingCoordinator::new(exchange, store, &config.trailing, Arc::new(TokioSleeper))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown requested, finishing current cycle...");
        let _ = shutdown_tx.send(true);
    });

    coordinator.run(shutdown_rx).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
