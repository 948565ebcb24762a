//! Telemetry forwarder binary.
//!
//! Accepts events on `POST /telemetry/event` and forwards them to every configured
//! provider. All settings come from environment variables (see `Config::from_env`).

use telemetry_forwarder::{
    build_http_client, server, Config, FanoutDispatcher, LogFormat, ProviderRegistry,
    RetryingSender,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config);

    let client = build_http_client(&config.http_client)?;
    let sender = RetryingSender::new(client, config.retry_policy())
        .with_max_connections_per_host(config.http_client.max_connections_per_host);
    let registry =
        ProviderRegistry::from_config(config.honeycomb.clone(), sender, config.circuit.clone());
    if registry.enabled().is_empty() {
        tracing::warn!("No providers enabled; accepted events will be dropped");
    }

    let shutdown = CancellationToken::new();
    let dispatcher = FanoutDispatcher::new(registry, shutdown.clone());
    let app = server::router(dispatcher.clone());

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        %addr,
        providers = ?dispatcher.registry().names(),
        max_attempts = config.max_attempts,
        max_connections_per_host = config.http_client.max_connections_per_host,
        "Telemetry forwarder listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!(grace_secs = config.shutdown_grace.as_secs(), "Draining in-flight deliveries");
    dispatcher.shutdown(config.shutdown_grace).await;

    info!("Telemetry forwarder shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
