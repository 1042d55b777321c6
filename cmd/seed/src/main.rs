//! # seed
//!
//! Operator tooling: imports a legacy or current document export into the
//! configured backend, dumps the stored document, and hashes moderator
//! passwords for the config file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use configs::{AppConfig, BackendKind, StoreConfig};
use domains::{AppError, Document, DocumentBackend};
use services::{normalize_legacy, RetryPolicy, VersionedStore};
use storage_adapters::FileBackend;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "seed", about = "newsroom operator tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a JSON export (legacy `posts` shape or current) into the store.
    Import {
        file: PathBuf,
        /// Replace a document that already holds submissions.
        #[arg(long)]
        force: bool,
    },
    /// Print the stored document as JSON.
    Export,
    /// Print an argon2 hash for `auth.moderator_password_hash` or
    /// `auth.intake_key_hash`.
    HashPassword {
        #[arg(env = "NEWSROOM_MODERATOR_PASSWORD")]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::HashPassword { password } => {
            println!("{}", auth_adapters::hash_password(&password)?);
        }
        Command::Import { file, force } => {
            let config = AppConfig::load()?;
            let store = open_store(&config.store).await?;
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let value = serde_json::from_str(&raw).context("export is not valid JSON")?;
            let count = import(&store, normalize_legacy(value)?, force).await?;
            info!(count, file = %file.display(), "import complete");
        }
        Command::Export => {
            let config = AppConfig::load()?;
            let store = open_store(&config.store).await?;
            let (document, _) = store.read().await?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
    }
    Ok(())
}

/// Writes `imported` as the whole document. Refuses to overwrite existing
/// submissions unless `force` is set.
async fn import(store: &VersionedStore, imported: Document, force: bool) -> domains::Result<usize> {
    let count = imported.submissions().count();
    store
        .update_document(|doc| {
            if !force && doc.submissions().next().is_some() {
                return Err(AppError::ValidationError(
                    "store already holds submissions; pass --force to replace them".into(),
                ));
            }
            *doc = imported.clone();
            Ok(count)
        })
        .await
}

async fn open_store(config: &StoreConfig) -> anyhow::Result<VersionedStore> {
    let backend: Arc<dyn DocumentBackend> = match config.backend {
        BackendKind::Memory => anyhow::bail!("the memory backend cannot be seeded from outside the server"),
        BackendKind::File => Arc::new(FileBackend::new(&config.path)),
        BackendKind::Postgres => postgres_backend(config).await?,
    };
    let retry = RetryPolicy::exponential(config.max_attempts, config.base_backoff())
        .with_max_delay(config.max_backoff());
    Ok(VersionedStore::new(backend).with_retry(retry))
}

#[cfg(feature = "db-postgres")]
async fn postgres_backend(config: &StoreConfig) -> anyhow::Result<Arc<dyn DocumentBackend>> {
    use secrecy::ExposeSecret;

    let url = config
        .database_url
        .as_ref()
        .context("store.database_url is required for the postgres backend")?;
    let backend = storage_adapters::PgBackend::connect(url.expose_secret(), config.document_key.clone()).await?;
    backend.ensure_schema().await?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "db-postgres"))]
async fn postgres_backend(_config: &StoreConfig) -> anyhow::Result<Arc<dyn DocumentBackend>> {
    anyhow::bail!("the postgres backend requires the `db-postgres` feature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use storage_adapters::InMemoryBackend;

    fn memory_store() -> (Arc<InMemoryBackend>, VersionedStore) {
        let backend = Arc::new(InMemoryBackend::new());
        let store = VersionedStore::new(backend.clone());
        (backend, store)
    }

    fn legacy_export() -> serde_json::Value {
        json!({
            "posts": [{
                "id": 3,
                "text": "Road closed on Main St",
                "createdAt": "2024-05-01T12:00:00Z",
                "authorId": 7,
                "authorName": "Ana"
            }],
            "pending": [],
            "rejected": []
        })
    }

    #[tokio::test]
    async fn import_fills_an_empty_store() {
        let (backend, store) = memory_store();
        let document = normalize_legacy(legacy_export()).unwrap();
        assert_eq!(import(&store, document, false).await.unwrap(), 1);
        assert_eq!(backend.document().unwrap().published.len(), 1);
    }

    #[tokio::test]
    async fn import_refuses_to_overwrite_without_force() {
        let (backend, store) = memory_store();
        let document = normalize_legacy(legacy_export()).unwrap();
        import(&store, document.clone(), false).await.unwrap();
        let before = backend.raw();

        let err = import(&store, Document::default(), false).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(backend.raw(), before);

        import(&store, Document::default(), true).await.unwrap();
        assert!(backend.document().unwrap().published.is_empty());
    }
}
