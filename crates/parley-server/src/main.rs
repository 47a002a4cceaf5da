//! Parley - Messaging service entry point

use anyhow::Result;
use parley_api::{cors_layer, create_router, AppState};
use parley_common::config::{Config, LoggingConfig};
use parley_core::{
    CampaignManager, CampaignScheduler, ChannelClients, EventRouter, GraphChannelClients,
    Metrics, NoopExternalSync, StaticCredentials, TokenBucket, WebhookGateway,
};
use parley_storage::{DatabasePool, Stores};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting Parley messaging service...");

    // Initialize storage
    let (db_pool, stores) = if config.database.url.is_some() {
        let db_pool = DatabasePool::new(&config.database).await?;
        db_pool.migrate().await?;
        (Some(db_pool.clone()), Stores::postgres(db_pool))
    } else {
        warn!("No database configured, using in-memory storage");
        (None, Stores::in_memory())
    };

    if config.webhook.app_secret.is_none() {
        warn!("Webhook app secret is not configured, inbound events will be rejected");
    }
    if config.api.key_hashes.is_empty() {
        warn!("No API keys configured, the management API will reject every request");
    }

    let metrics = Metrics::new()?;

    // Provider clients
    let credentials = Arc::new(StaticCredentials::new(&config.channels));
    let clients: Arc<dyn ChannelClients> =
        Arc::new(GraphChannelClients::new(config.graph.clone(), credentials)?);

    // Pipeline
    let router = Arc::new(EventRouter::build(
        stores.clone(),
        clients.clone(),
        &config,
        Arc::new(NoopExternalSync),
        metrics.clone(),
    ));
    let gateway = Arc::new(WebhookGateway::new(
        config.webhook.clone(),
        stores.webhook_events.clone(),
        router.clone(),
        metrics.clone(),
    ));
    let campaigns = Arc::new(CampaignManager::new(
        &stores,
        clients,
        TokenBucket::new(config.broadcast.rate_per_second, config.broadcast.burst),
        metrics.clone(),
    ));

    // Start campaign scheduler
    let scheduler_handle = {
        let scheduler = CampaignScheduler::new(campaigns.clone())
            .with_poll_interval(config.broadcast.scheduler_interval_secs);
        tokio::spawn(async move {
            scheduler.run().await;
        })
    };

    let state = AppState {
        db_pool,
        stores,
        gateway,
        campaigns,
        tracker: router.tracker(),
        metrics,
        api_key_hashes: Arc::new(config.api.key_hashes.clone()),
    };
    let app = create_router(state).layer(cors_layer(&config.api.cors_origins));

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Starting API server on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("API server error: {}", e);
    }

    scheduler_handle.abort();
    info!("Parley shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
