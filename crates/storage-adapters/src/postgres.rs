//! # PgBackend
//!
//! Stores the document as one JSONB row per key. The version column is the
//! compare-and-swap token; every committed write increments it.

use async_trait::async_trait;
use domains::{AppError, Document, DocumentBackend, Result, Snapshot, VersionToken, WriteOutcome};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Row;
use tracing::debug;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS documents (
    key     TEXT PRIMARY KEY,
    body    JSONB NOT NULL,
    version BIGINT NOT NULL
)";

pub struct PgBackend {
    pool: PgPool,
    key: String,
}

fn store_error(err: sqlx::Error) -> AppError {
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            AppError::Internal(format!("stored document is not valid: {err}"))
        }
        other => AppError::Unavailable(other.to_string()),
    }
}

impl PgBackend {
    pub async fn connect(database_url: &str, key: impl Into<String>) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(store_error)?;
        Ok(Self::from_pool(pool, key))
    }

    pub fn from_pool(pool: PgPool, key: impl Into<String>) -> Self {
        Self {
            pool,
            key: key.into(),
        }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

#[async_trait]
impl DocumentBackend for PgBackend {
    async fn read(&self) -> Result<Snapshot> {
        let row = sqlx::query("SELECT body, version FROM documents WHERE key = $1")
            .bind(&self.key)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        let Some(row) = row else {
            return Ok(Snapshot {
                document: None,
                version: VersionToken::absent(),
            });
        };
        let Json(document): Json<Document> = row.try_get("body").map_err(store_error)?;
        let version: i64 = row.try_get("version").map_err(store_error)?;
        Ok(Snapshot {
            document: Some(document),
            version: VersionToken::new(version.to_string()),
        })
    }

    async fn write(&self, document: &Document, expected: &VersionToken) -> Result<WriteOutcome> {
        if expected.is_absent() {
            let inserted = sqlx::query(
                "INSERT INTO documents (key, body, version) VALUES ($1, $2, 1)
                 ON CONFLICT (key) DO NOTHING",
            )
            .bind(&self.key)
            .bind(Json(document))
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
            return Ok(if inserted.rows_affected() == 1 {
                WriteOutcome::Committed(VersionToken::new("1"))
            } else {
                WriteOutcome::Conflict
            });
        }

        let Ok(expected_version) = expected.as_str().parse::<i64>() else {
            debug!(token = expected.as_str(), "token was not issued by this backend");
            return Ok(WriteOutcome::Conflict);
        };
        let next: Option<i64> = sqlx::query_scalar(
            "UPDATE documents SET body = $1, version = version + 1
             WHERE key = $2 AND version = $3
             RETURNING version",
        )
        .bind(Json(document))
        .bind(&self.key)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(match next {
            Some(version) => WriteOutcome::Committed(VersionToken::new(version.to_string())),
            None => WriteOutcome::Conflict,
        })
    }
}
