//! # FileBackend
//!
//! The document as one JSON file on local disk. The version token is the
//! SHA-256 of the file contents, so any change to the file (including one
//! made by hand) invalidates outstanding tokens.
//!
//! Compare-and-swap is serialized within this process only; two processes
//! sharing the same file are not supported.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use domains::{AppError, Document, DocumentBackend, Result, Snapshot, VersionToken, WriteOutcome};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

pub struct FileBackend {
    path: PathBuf,
    write_lock: Mutex<()>,
}

fn token_for(bytes: &[u8]) -> VersionToken {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    VersionToken::new(hex::encode(hasher.finalize()))
}

fn unavailable(path: &Path, err: std::io::Error) -> AppError {
    AppError::Unavailable(format!("{}: {err}", path.display()))
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(unavailable(&self.path, err)),
        }
    }

    fn current_token(bytes: &Option<Vec<u8>>) -> VersionToken {
        bytes.as_deref().map_or_else(VersionToken::absent, token_for)
    }
}

#[async_trait]
impl DocumentBackend for FileBackend {
    async fn read(&self) -> Result<Snapshot> {
        let Some(bytes) = self.read_bytes().await? else {
            return Ok(Snapshot {
                document: None,
                version: VersionToken::absent(),
            });
        };
        let document = serde_json::from_slice::<Document>(&bytes).map_err(|e| {
            AppError::Internal(format!("{} is not a valid document: {e}", self.path.display()))
        })?;
        Ok(Snapshot {
            document: Some(document),
            version: token_for(&bytes),
        })
    }

    async fn write(&self, document: &Document, expected: &VersionToken) -> Result<WriteOutcome> {
        let body = serde_json::to_vec_pretty(document)
            .map_err(|e| AppError::Internal(format!("document does not serialize: {e}")))?;

        let _guard = self.write_lock.lock().await;
        let current = self.read_bytes().await?;
        if Self::current_token(&current) != *expected {
            debug!(path = %self.path.display(), "file changed since it was read");
            return Ok(WriteOutcome::Conflict);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| unavailable(parent, e))?;
        }
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, &body)
            .await
            .map_err(|e| unavailable(&staging, e))?;
        fs::rename(&staging, &self.path)
            .await
            .map_err(|e| unavailable(&self.path, e))?;

        Ok(WriteOutcome::Committed(token_for(&body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn missing_file_is_an_absent_document() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("db.json"));
        let snapshot = assert_ok!(backend.read().await);
        assert!(snapshot.document.is_none());
        assert!(snapshot.version.is_absent());
    }

    #[tokio::test]
    async fn write_then_read_shares_the_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("nested").join("db.json"));

        let outcome = assert_ok!(backend.write(&Document::default(), &VersionToken::absent()).await);
        let WriteOutcome::Committed(token) = outcome else {
            panic!("first write should commit");
        };
        let snapshot = assert_ok!(backend.read().await);
        assert_eq!(snapshot.version, token);
        assert_eq!(snapshot.document, Some(Document::default()));
    }

    #[tokio::test]
    async fn out_of_band_edit_invalidates_the_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        let backend = FileBackend::new(&path);
        assert_ok!(backend.write(&Document::default(), &VersionToken::absent()).await);
        let snapshot = assert_ok!(backend.read().await);

        std::fs::write(&path, br#"{"pending":[],"published":[],"rejected":[],"note":1}"#).unwrap();
        let outcome = assert_ok!(backend.write(&Document::default(), &snapshot.version).await);
        assert_eq!(outcome, WriteOutcome::Conflict);
    }

    #[tokio::test]
    async fn garbage_file_is_internal_not_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, b"not json").unwrap();
        let err = FileBackend::new(&path).read().await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
