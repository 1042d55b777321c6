//! In-process backend. The document is kept as serialized JSON so that every
//! read hands out an independent copy, like a remote store would.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use domains::{AppError, Document, DocumentBackend, Result, Snapshot, VersionToken, WriteOutcome};
use tracing::trace;

#[derive(Default)]
struct Stored {
    body: Option<String>,
    version: u64,
}

impl Stored {
    fn token(&self) -> VersionToken {
        match self.body {
            Some(_) => VersionToken::new(self.version.to_string()),
            None => VersionToken::absent(),
        }
    }
}

/// Counter-versioned backend with fault injection for tests.
#[derive(Default)]
pub struct InMemoryBackend {
    stored: Mutex<Stored>,
    unavailable: AtomicBool,
    forced_conflicts: AtomicU32,
    conflict_every: AtomicU32,
    write_attempts: AtomicU64,
    commits: AtomicU64,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts out holding `document` at version 1.
    pub fn with_document(document: Document) -> Self {
        let backend = Self::new();
        if let Ok(mut stored) = backend.stored.lock() {
            stored.body = serde_json::to_string(&document).ok();
            stored.version = 1;
        }
        backend
    }

    /// The next `n` writes report a conflict regardless of their token.
    pub fn inject_conflicts(&self, n: u32) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    /// Every `k`-th write attempt reports a conflict. `0` turns it off.
    pub fn conflict_every(&self, k: u32) {
        self.conflict_every.store(k, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Committed writes so far.
    pub fn write_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Raw stored JSON, bypassing every fault.
    pub fn raw(&self) -> Option<String> {
        self.stored.lock().ok().and_then(|s| s.body.clone())
    }

    /// Stored document, bypassing every fault.
    pub fn document(&self) -> Option<Document> {
        self.raw().and_then(|body| serde_json::from_str(&body).ok())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("in-memory backend switched off".into()));
        }
        Ok(())
    }

    fn injected_conflict(&self, attempt: u64) -> bool {
        let forced = self
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let every = u64::from(self.conflict_every.load(Ordering::SeqCst));
        forced || (every > 0 && attempt % every == 0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Stored>> {
        self.stored
            .lock()
            .map_err(|_| AppError::Internal("in-memory backend lock poisoned".into()))
    }
}

#[async_trait]
impl DocumentBackend for InMemoryBackend {
    async fn read(&self) -> Result<Snapshot> {
        self.check_available()?;
        tokio::task::yield_now().await;
        let (body, version) = {
            let stored = self.lock()?;
            (stored.body.clone(), stored.token())
        };
        let document = body
            .map(|b| serde_json::from_str::<Document>(&b))
            .transpose()
            .map_err(|e| AppError::Internal(format!("stored document is not valid: {e}")))?;
        Ok(Snapshot { document, version })
    }

    async fn write(&self, document: &Document, expected: &VersionToken) -> Result<WriteOutcome> {
        self.check_available()?;
        // Lets concurrent read-modify-write cycles interleave on one thread.
        tokio::task::yield_now().await;
        let attempt = self.write_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.injected_conflict(attempt) {
            trace!(attempt, "injected conflict");
            return Ok(WriteOutcome::Conflict);
        }

        let body = serde_json::to_string(document)
            .map_err(|e| AppError::Internal(format!("document does not serialize: {e}")))?;
        let mut stored = self.lock()?;
        if stored.token() != *expected {
            return Ok(WriteOutcome::Conflict);
        }
        stored.body = Some(body);
        stored.version += 1;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(WriteOutcome::Committed(stored.token()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn fresh_backend_reads_absent() {
        let backend = InMemoryBackend::new();
        let snapshot = assert_ok!(backend.read().await);
        assert!(snapshot.document.is_none());
        assert!(snapshot.version.is_absent());
    }

    #[tokio::test]
    async fn stale_token_conflicts() {
        let backend = InMemoryBackend::new();
        let doc = Document::default();
        let first = assert_ok!(backend.write(&doc, &VersionToken::absent()).await);
        assert!(matches!(first, WriteOutcome::Committed(_)));

        let again = assert_ok!(backend.write(&doc, &VersionToken::absent()).await);
        assert_eq!(again, WriteOutcome::Conflict);
        assert_eq!(backend.write_count(), 1);
    }

    #[tokio::test]
    async fn injected_faults() {
        let backend = InMemoryBackend::new();
        backend.inject_conflicts(1);
        let token = VersionToken::absent();
        assert_eq!(
            assert_ok!(backend.write(&Document::default(), &token).await),
            WriteOutcome::Conflict
        );

        backend.set_unavailable(true);
        assert!(matches!(backend.read().await, Err(AppError::Unavailable(_))));
        backend.set_unavailable(false);
        assert!(backend.read().await.is_ok());
    }
}
