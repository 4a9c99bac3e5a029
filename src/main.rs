// Knowledge-base relay bot
// Run with: cargo run --bin kbrelay

use std::sync::Arc;

use dotenv::dotenv;
use serenity::{prelude::*, Client as DiscordClient};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kbrelay::{
    config::Config,
    debounce::Debouncer,
    dispatch::Dispatcher,
    gemini::GeminiClient,
    handler::{DiscordReplies, Handler},
    health::HealthChecker,
    metrics::MetricsRegistry,
    metrics_server::{self, HealthTargets},
    sync_state::SyncStateFile,
};

type DynErr = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), DynErr> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::from_env()?;
    info!(
        model = %cfg.gemini_model,
        stores = cfg.store_names.len(),
        quiet_ms = cfg.quiet_period.as_millis() as u64,
        retention_secs = cfg.retention.as_secs(),
        "Starting kbrelay..."
    );

    let (debouncer, flushes) = Debouncer::new(cfg.debounce_settings());
    let gemini = Arc::new(GeminiClient::new(&cfg)?);
    let health = Arc::new(HealthChecker::new());
    let sync_state = SyncStateFile::new(&cfg.sync_state_path);

    let intents = GatewayIntents::DIRECT_MESSAGES | GatewayIntents::MESSAGE_CONTENT;
    let mut client = DiscordClient::builder(&cfg.discord_token, intents)
        .event_handler(Handler {
            debouncer: debouncer.clone(),
            health: health.clone(),
        })
        .await?;

    let dispatcher = Arc::new(Dispatcher::new(
        gemini.clone(),
        DiscordReplies::new(client.http.clone()),
        sync_state.clone(),
    ));
    let worker = tokio::spawn(dispatcher.clone().run(flushes));

    if let Some(port) = cfg.metrics_port {
        let targets = Arc::new(HealthTargets {
            checker: health.clone(),
            gemini: gemini.clone(),
            sync_state,
        });
        tokio::spawn(metrics_server::serve(port, Arc::new(MetricsRegistry::new()), targets));
    }

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested, stopping shards...");
            shard_manager.shutdown_all().await;
        }
    });

    if let Err(err) = client.start().await {
        error!("Client error: {err:?}");
    }

    dispatcher.shutdown(&debouncer, worker).await;
    info!("Shutdown complete");

    Ok(())
}
