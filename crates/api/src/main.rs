//! TaskHerald server binary entrypoint.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use herald_common::config::AppConfig;
use herald_engine::dedup::{DedupStore, MemoryDedupStore, SqliteDedupStore};
use herald_engine::scheduler::{IntervalPolicy, Scheduler};
use herald_notifier::{DeliveryChannel, LocalAlertChannel, WebhookChannel};
use herald_source::HttpTaskSource;

use herald_api::routes::create_router;
use herald_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "herald_api=info,herald_engine=info,herald_source=info,herald_notifier=info",
            )
        }))
        .json()
        .init();

    tracing::info!("Starting TaskHerald...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Dedup store: sqlite when a path is configured, in-memory otherwise
    let dedup: Arc<dyn DedupStore> = match &config.dedup_db_path {
        Some(path) => {
            let store = SqliteDedupStore::connect(path).await?;
            tracing::info!(path = %path, "Using sqlite dedup store");
            Arc::new(store)
        }
        None => {
            tracing::info!("Using in-memory dedup store");
            Arc::new(MemoryDedupStore::new())
        }
    };

    let send_timeout = Duration::from_secs(config.notify_send_timeout_secs);
    let source = Arc::new(HttpTaskSource::new(
        config.task_api_url.clone(),
        config.task_api_token.clone(),
        send_timeout,
    ));

    let local_alerts = Arc::new(LocalAlertChannel::new(config.local_alert_authorization));
    let webhook = config
        .webhook_settings()
        .map(|settings| Arc::new(WebhookChannel::with_timeout(Some(settings), send_timeout)));

    let mut channels: Vec<Arc<dyn DeliveryChannel>> = vec![local_alerts.clone()];
    if let Some(webhook) = &webhook {
        channels.push(webhook.clone());
    }

    let scheduler = Scheduler::new(
        source,
        channels,
        dedup,
        IntervalPolicy::from_config(&config),
    );

    if config.engine_autostart {
        if let Err(e) = scheduler.start().await {
            tracing::error!(error = %e, "Engine autostart failed; start it via the API");
        }
    }

    // Build application state
    let state = AppState::new(scheduler.clone(), local_alerts, webhook);

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    tracing::info!("API server listening on {}", config.api_bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.api_bind_addr).await?;

    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    scheduler.stop();
    tracing::info!("TaskHerald stopped");
    Ok(())
}
