use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use intent_action::actions::{ActionRegistry, HandlerSettings};
use intent_action::channels::{Channel, CliChannel, http_routes};
use intent_action::config::ServiceConfig;
use intent_action::router::IntentRouter;
use intent_action::service;

/// Stderr logging plus an optional daily-rolling file.
///
/// Stdout is left alone: the CLI channel writes speech events there.
fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "intent-action.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = ServiceConfig::from_env();
    let _log_guard = init_logging(config.as_ref().ok().and_then(|c| c.log_dir.as_deref()));
    let config = config.context("Failed to load configuration")?;

    tracing::info!(
        profile = %config.profile_dir.display(),
        actions = %config.actions_dir.display(),
        intent_map = %config.intent_map_path.display(),
        sites = ?config.site_ids,
        "Starting intent-action"
    );

    let mut registry = ActionRegistry::new(config.actions_dir.clone(), HandlerSettings::from(&config));
    let router = Arc::new(
        IntentRouter::load(&config.intent_map_path, &mut registry)
            .with_site_ids(config.site_ids.clone()),
    );
    tracing::info!(actions = registry.count(), "Actions prepared");

    match config.http_port {
        Some(port) => {
            let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
                .await
                .with_context(|| format!("Failed to bind HTTP port {port}"))?;
            tracing::info!(port, "HTTP ingress started");
            axum::serve(listener, http_routes(router))
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await
                .context("HTTP server failed")?;
        }
        None => {
            let channel: Arc<dyn Channel> = Arc::new(CliChannel::new());
            tokio::select! {
                result = service::run(router, channel) => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
            }
        }
    }

    tracing::info!("Shutting down");
    Ok(())
}
