//! # VersionedStore
//!
//! Read-modify-write on top of a backend that only offers compare-and-swap.
//! [`VersionedStore::update_document`] is the only sanctioned way to mutate
//! the document: it re-reads and re-applies the mutator whenever another
//! writer got there first, so concurrent handlers never lose each other's
//! updates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use domains::{AppError, Document, DocumentBackend, Result, VersionToken, WriteOutcome};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::metrics::PipelineMetrics;
use crate::retry::RetryPolicy;

struct CachedSnapshot {
    loaded_at: Instant,
    document: Arc<Document>,
}

pub struct VersionedStore {
    backend: Arc<dyn DocumentBackend>,
    retry: RetryPolicy,
    cache_ttl: Duration,
    cache: RwLock<Option<CachedSnapshot>>,
    /// Bumped by every invalidation; a read that straddles one is not cached.
    generation: AtomicU64,
    metrics: PipelineMetrics,
}

impl VersionedStore {
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        Self {
            backend,
            retry: RetryPolicy::default(),
            cache_ttl: Duration::ZERO,
            cache: RwLock::new(None),
            generation: AtomicU64::new(0),
            metrics: PipelineMetrics::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enables the read-through cache used by [`Self::snapshot`].
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Fresh read from the backend. A document that was never written reads
    /// as empty; backend failures propagate.
    pub async fn read(&self) -> Result<(Document, VersionToken)> {
        let snapshot = self.backend.read().await?;
        if snapshot.document.is_none() {
            debug!("document absent; starting from an empty one");
        }
        Ok((snapshot.document.unwrap_or_default(), snapshot.version))
    }

    /// Possibly stale view for queries. Never use it as the base of a
    /// mutation.
    pub async fn snapshot(&self) -> Result<Arc<Document>> {
        if !self.cache_ttl.is_zero() {
            if let Some(cached) = self.cache.read().await.as_ref() {
                if cached.loaded_at.elapsed() < self.cache_ttl {
                    return Ok(Arc::clone(&cached.document));
                }
            }
        }

        let generation = self.generation.load(Ordering::Acquire);
        let (document, _) = self.read().await?;
        let document = Arc::new(document);
        if !self.cache_ttl.is_zero() {
            let mut cache = self.cache.write().await;
            if self.generation.load(Ordering::Acquire) == generation {
                *cache = Some(CachedSnapshot {
                    loaded_at: Instant::now(),
                    document: Arc::clone(&document),
                });
            } else {
                debug!("a commit landed during the read; not caching it");
            }
        }
        Ok(document)
    }

    pub async fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        *self.cache.write().await = None;
    }

    /// Applies `mutator` with the store's default attempt budget.
    pub async fn update_document<T, F>(&self, mutator: F) -> Result<T>
    where
        F: FnMut(&mut Document) -> Result<T> + Send,
        T: Send,
    {
        self.update_document_with(self.retry.max_attempts(), mutator)
            .await
    }

    /// Read, mutate a working copy, then write it back conditioned on the
    /// version that was read.
    ///
    /// The mutator may run once per attempt and must touch nothing but the
    /// document it is handed. Its result is returned from the attempt that
    /// committed. An `Err` from the mutator aborts without writing. A
    /// mutation that leaves the document unchanged is not written at all.
    pub async fn update_document_with<T, F>(&self, max_attempts: u32, mut mutator: F) -> Result<T>
    where
        F: FnMut(&mut Document) -> Result<T> + Send,
        T: Send,
    {
        let mut retry = self.retry.clone().with_max_attempts(max_attempts).handle();
        loop {
            let attempt = retry.attempts() + 1;
            let (base, version) = self.read().await?;
            let mut working = base.clone();
            let result = mutator(&mut working)?;

            if working == base {
                debug!(attempt, "mutation left the document unchanged; nothing to write");
                return Ok(result);
            }

            match self.backend.write(&working, &version).await? {
                WriteOutcome::Committed(next) => {
                    self.metrics.commits.inc();
                    self.invalidate().await;
                    debug!(attempt, version = next.as_str(), "document committed");
                    return Ok(result);
                }
                WriteOutcome::Conflict => {
                    self.metrics.conflicts.inc();
                    match retry.next_delay() {
                        Some(delay) => {
                            debug!(
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "version conflict; retrying against the newer document"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            self.metrics.exhausted.inc();
                            warn!(attempts = attempt, "giving up after repeated version conflicts");
                            return Err(AppError::ConcurrencyExhausted { attempts: attempt });
                        }
                    }
                }
            }
        }
    }
}
