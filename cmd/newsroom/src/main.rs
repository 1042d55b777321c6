//! # newsroom
//!
//! The entry point that assembles the pipeline based on configuration and
//! compile-time features.

use std::sync::Arc;

use anyhow::Context;
use api_adapters::{router, AppState};
use auth_adapters::StaticAuthProvider;
use configs::{AppConfig, BackendKind, LogFormat, ServerConfig, StoreConfig, TelegramConfig};
use domains::{AuthProvider, DocumentBackend, ModerationNotifier};
use prometheus_client::registry::Registry;
use services::{
    AggregatorConfig, Feed, Intake, MediaAggregator, ModerationDesk, ModerationWorkflow, PipelineMetrics,
    Publisher, ReactionLedger, RetryPolicy, SubmissionRepository, SystemClock, VersionedStore,
};
use storage_adapters::{FileBackend, InMemoryBackend};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.server);

    // 1. Document storage
    let backend = open_backend(&config.store).await?;
    let metrics = PipelineMetrics::default();
    let mut registry = Registry::default();
    metrics.register(&mut registry);

    let retry = RetryPolicy::exponential(config.store.max_attempts, config.store.base_backoff())
        .with_max_delay(config.store.max_backoff());
    let store = Arc::new(
        VersionedStore::new(backend)
            .with_retry(retry)
            .with_cache_ttl(config.store.cache_ttl())
            .with_metrics(metrics),
    );

    // 2. Pipeline
    let clock = Arc::new(SystemClock);
    let repo = Arc::new(SubmissionRepository::new(store.clone(), clock.clone()));
    let notifier = moderation_notifier(&config.telegram);
    let publisher = Arc::new(Publisher::new(repo.clone(), notifier.clone()));
    let aggregator = Arc::new(MediaAggregator::new(
        publisher.clone(),
        clock,
        AggregatorConfig {
            quiet_period: config.intake.quiet_period(),
            retention: config.intake.retention(),
            caption_wait: config.intake.caption_wait(),
        },
    ));
    let sweeper = aggregator.clone().spawn_sweeper(config.intake.sweep_interval());

    // 3. Auth
    let mut auth = StaticAuthProvider::new(&config.auth.admin_usernames, config.auth.admin_ids.iter().copied());
    match &config.auth.moderator_password_hash {
        Some(hash) => auth = auth.with_moderator_hash(hash.clone()),
        None => warn!("no moderator password hash configured; moderation endpoints will reject every request"),
    }
    match &config.auth.intake_key_hash {
        Some(hash) => auth = auth.with_intake_hash(hash.clone()),
        None => warn!("no intake key hash configured; the intake endpoint will reject every request"),
    }
    let auth: Arc<dyn AuthProvider> = Arc::new(auth);

    // 4. HTTP surface
    let state = AppState {
        feed: Arc::new(Feed::new(store.clone())),
        reactions: Arc::new(ReactionLedger::new(store)),
        intake: Arc::new(Intake::new(publisher, aggregator, auth.clone())),
        desk: Arc::new(ModerationDesk::new(ModerationWorkflow::new(repo), notifier)),
        auth,
        registry: Arc::new(registry),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    info!("newsroom listening on http://{}", config.server.bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    info!("newsroom stopped");
    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&server.log_filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match server.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn open_backend(store: &StoreConfig) -> anyhow::Result<Arc<dyn DocumentBackend>> {
    let backend: Arc<dyn DocumentBackend> = match store.backend {
        BackendKind::Memory => {
            warn!("using the in-memory backend; submissions are lost on restart");
            Arc::new(InMemoryBackend::new())
        }
        BackendKind::File => {
            info!(path = %store.path, "using the file backend");
            Arc::new(FileBackend::new(&store.path))
        }
        BackendKind::Postgres => postgres_backend(store).await?,
    };
    Ok(backend)
}

#[cfg(feature = "db-postgres")]
async fn postgres_backend(store: &StoreConfig) -> anyhow::Result<Arc<dyn DocumentBackend>> {
    use secrecy::ExposeSecret;

    let url = store
        .database_url
        .as_ref()
        .context("store.database_url is required for the postgres backend")?;
    let backend = storage_adapters::PgBackend::connect(url.expose_secret(), store.document_key.clone()).await?;
    backend.ensure_schema().await?;
    info!(key = %store.document_key, "using the postgres backend");
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "db-postgres"))]
async fn postgres_backend(_store: &StoreConfig) -> anyhow::Result<Arc<dyn DocumentBackend>> {
    anyhow::bail!("the postgres backend requires the `db-postgres` feature")
}

#[cfg(feature = "telegram")]
fn moderation_notifier(telegram: &TelegramConfig) -> Option<Arc<dyn ModerationNotifier>> {
    match (&telegram.bot_token, telegram.moderation_chat_id) {
        (Some(token), Some(chat_id)) => {
            info!(chat_id, "moderation prompts go to telegram");
            let notifier: Arc<dyn ModerationNotifier> =
                Arc::new(api_adapters::TelegramNotifier::new(&telegram.api_base, token, chat_id));
            Some(notifier)
        }
        _ => {
            warn!("telegram is not configured; pending submissions get no moderation prompt");
            None
        }
    }
}

#[cfg(not(feature = "telegram"))]
fn moderation_notifier(telegram: &TelegramConfig) -> Option<Arc<dyn ModerationNotifier>> {
    if telegram.enabled() {
        warn!("telegram settings are present but the `telegram` feature is not compiled in");
    }
    None
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
