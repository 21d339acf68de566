mod app;
mod bootstrap;
mod chat;
mod health;
mod predict;
mod weather;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use agrivision_agent::SessionStore;
use agrivision_core::config::{AppConfig, LoadOptions};
use anyhow::Result;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

fn init_logging(config: &AppConfig) {
    use agrivision_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging must be up before bootstrap so its events are visible.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let application = bootstrap::bootstrap(config).await?;
    let server_config = application.config.server.clone();

    let pruner = spawn_session_pruner(
        Arc::clone(application.state.runtime.sessions()),
        Duration::from_secs(application.config.session.prune_interval_secs),
    );

    let address = format!("{}:{}", server_config.bind_address, server_config.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        llm_provider = application.state.llm_provider,
        "agrivision-server listening"
    );

    let shutdown = Arc::new(Notify::new());
    let drain_signal = Arc::clone(&shutdown);
    let mut server = tokio::spawn(
        axum::serve(listener, app::router(application.state))
            .with_graceful_shutdown(async move { drain_signal.notified().await })
            .into_future(),
    );

    tokio::select! {
        joined = &mut server => {
            pruner.abort();
            joined??;
            return Ok(());
        }
        signal = wait_for_shutdown() => signal?,
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        drain_secs = server_config.graceful_shutdown_secs,
        "agrivision-server stopping"
    );
    shutdown.notify_one();
    pruner.abort();

    let drain = Duration::from_secs(server_config.graceful_shutdown_secs);
    match tokio::time::timeout(drain, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            "in-flight requests did not finish before the drain deadline"
        ),
    }

    Ok(())
}

fn spawn_session_pruner(sessions: Arc<SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = sessions.prune_expired().await;
            if removed > 0 {
                let remaining = sessions.len().await;
                tracing::debug!(
                    event_name = "system.sessions.pruned",
                    removed,
                    remaining,
                    "expired sessions pruned"
                );
            }
        }
    })
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
