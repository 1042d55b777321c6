//! # MediaAggregator
//!
//! Reassembles an album (a burst of independently delivered attachment
//! messages sharing one batch id) into a single submission.
//!
//! Each `(submitter, batch)` key is a small state machine:
//!
//! * **Collecting**: attachments accumulate. The first caption creates the
//!   submission right away with everything buffered so far.
//! * **Bound**: the submission exists; later album items are appended to it.
//! * A Collecting batch that stays quiet for the quiet period is created
//!   without a caption. A Bound batch is forgotten after the retention
//!   interval.
//!
//! Time only advances through the injected [`Clock`]; [`MediaAggregator::sweep`]
//! applies both timers and is driven by [`MediaAggregator::spawn_sweeper`] in
//! production.
//!
//! The buffers live in this process only, so a deployment must run a single
//! aggregator instance.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use domains::{
    merge_attachments, Attachment, Clock, OriginAttribution, Result, SubmissionDraft,
    SubmissionId, Submitter, UserId,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::elapsed;
use crate::submissions::{CreatedSubmission, SubmissionRepository};

/// Where assembled submissions go.
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn create(&self, draft: SubmissionDraft) -> Result<CreatedSubmission>;

    /// Returns `false` if the submission no longer accepts attachments.
    async fn append(&self, id: SubmissionId, items: &[Attachment]) -> Result<bool>;

    /// Follow-up work after a creation, run once the batch is released so
    /// sibling album items are not held up by it.
    async fn announce(&self, _created: &CreatedSubmission) {}
}

#[async_trait]
impl SubmissionSink for SubmissionRepository {
    async fn create(&self, draft: SubmissionDraft) -> Result<CreatedSubmission> {
        SubmissionRepository::create(self, draft).await
    }

    async fn append(&self, id: SubmissionId, items: &[Attachment]) -> Result<bool> {
        self.append_attachments(id, items).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub submitter_id: UserId,
    pub batch_id: String,
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Silence after the last album item before finalizing without caption.
    pub quiet_period: Duration,
    /// How long a Bound batch is remembered for late album items.
    pub retention: Duration,
    /// How long caption-less single media waits for a follow-up text.
    pub caption_wait: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_millis(1500),
            retention: Duration::from_secs(30),
            caption_wait: Duration::from_secs(600),
        }
    }
}

/// One album message.
#[derive(Debug, Clone)]
pub struct BatchEvent {
    pub submitter: Submitter,
    pub privileged: bool,
    pub attachments: Vec<Attachment>,
    pub caption: Option<String>,
    pub origin_attribution: Option<OriginAttribution>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationOutcome {
    /// Still collecting; `attachments` are buffered so far.
    Buffered { attachments: usize },
    /// This event completed the batch.
    Created(CreatedSubmission),
    /// Forwarded to an existing submission.
    Appended {
        submission_id: SubmissionId,
        accepted: bool,
    },
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepReport {
    pub finalized: Vec<CreatedSubmission>,
    pub failed: usize,
    pub forgotten: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BatchState {
    Collecting,
    Bound {
        submission_id: SubmissionId,
        bound_at: DateTime<Utc>,
    },
}

#[derive(Debug)]
struct BatchEntry {
    submitter: Submitter,
    privileged: bool,
    attachments: Vec<Attachment>,
    body: Option<String>,
    origin_attribution: Option<OriginAttribution>,
    last_event_at: DateTime<Utc>,
    state: BatchState,
}

impl BatchEntry {
    fn draft(&self) -> SubmissionDraft {
        SubmissionDraft {
            body: self.body.clone().unwrap_or_default(),
            submitter: self.submitter.clone(),
            attachments: self.attachments.clone(),
            origin_attribution: self.origin_attribution.clone(),
            privileged: self.privileged,
        }
    }
}

/// Caption-less media sent outside an album, waiting for the submitter's
/// next text message.
#[derive(Debug, Clone, PartialEq)]
pub struct StashedMedia {
    pub attachments: Vec<Attachment>,
    pub origin_attribution: Option<OriginAttribution>,
    pub stashed_at: DateTime<Utc>,
}

pub struct MediaAggregator {
    sink: Arc<dyn SubmissionSink>,
    clock: Arc<dyn Clock>,
    config: AggregatorConfig,
    batches: DashMap<BatchKey, Arc<Mutex<BatchEntry>>>,
    stash: DashMap<UserId, StashedMedia>,
}

impl MediaAggregator {
    pub fn new(sink: Arc<dyn SubmissionSink>, clock: Arc<dyn Clock>, config: AggregatorConfig) -> Self {
        Self {
            sink,
            clock,
            config,
            batches: DashMap::new(),
            stash: DashMap::new(),
        }
    }

    /// Feeds one album message into its batch.
    ///
    /// If creating the submission fails, the buffered attachments (and the
    /// caption) are kept and the error is returned; the next sweep after the
    /// quiet period retries the creation.
    pub async fn on_event(&self, key: BatchKey, event: BatchEvent) -> Result<AggregationOutcome> {
        let now = self.clock.now();
        let mut entry = loop {
            let slot = self
                .batches
                .entry(key.clone())
                .or_insert_with(|| {
                    debug!(submitter = key.submitter_id, batch = %key.batch_id, "new album batch");
                    Arc::new(Mutex::new(BatchEntry {
                        submitter: event.submitter.clone(),
                        privileged: event.privileged,
                        attachments: Vec::new(),
                        body: None,
                        origin_attribution: None,
                        last_event_at: now,
                        state: BatchState::Collecting,
                    }))
                })
                .clone();

            let entry = Arc::clone(&slot).lock_owned().await;
            // A sweep may have dropped the slot while we waited for it.
            let current = self
                .batches
                .get(&key)
                .is_some_and(|live| Arc::ptr_eq(live.value(), &slot));
            if current {
                break entry;
            }
            debug!(batch = %key.batch_id, "batch was swept while waiting; retrying");
        };
        entry.last_event_at = now;
        if entry.origin_attribution.is_none() {
            entry.origin_attribution = event.origin_attribution;
        }

        let state = entry.state;
        match state {
            BatchState::Bound { submission_id, .. } => {
                if event.caption.is_some() {
                    debug!(submission_id, "caption for an already created album; keeping the first one");
                }
                merge_attachments(&mut entry.attachments, &event.attachments);
                let accepted = self.sink.append(submission_id, &event.attachments).await?;
                Ok(AggregationOutcome::Appended {
                    submission_id,
                    accepted,
                })
            }
            BatchState::Collecting => {
                merge_attachments(&mut entry.attachments, &event.attachments);
                if entry.body.is_none() {
                    entry.body = event.caption;
                }
                if entry.body.is_none() {
                    return Ok(AggregationOutcome::Buffered {
                        attachments: entry.attachments.len(),
                    });
                }
                let created = self.bind(&mut entry, now).await?;
                drop(entry);
                self.sink.announce(&created).await;
                info!(
                    id = created.submission.id,
                    batch = %key.batch_id,
                    attachments = created.submission.attachments.len(),
                    "album bound by caption"
                );
                Ok(AggregationOutcome::Created(created))
            }
        }
    }

    async fn bind(&self, entry: &mut BatchEntry, now: DateTime<Utc>) -> Result<CreatedSubmission> {
        let created = self.sink.create(entry.draft()).await?;
        entry.state = BatchState::Bound {
            submission_id: created.submission.id,
            bound_at: now,
        };
        Ok(created)
    }

    /// Applies the quiet-period and retention timers as of the clock's now.
    pub async fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();
        let slots: Vec<_> = self
            .batches
            .iter()
            .map(|item| (item.key().clone(), Arc::clone(item.value())))
            .collect();

        for (key, slot) in slots {
            let mut entry = slot.lock().await;
            let state = entry.state;
            match state {
                BatchState::Collecting if elapsed(entry.last_event_at, now) >= self.config.quiet_period => {
                    if entry.attachments.is_empty() {
                        self.batches.remove_if(&key, |_, v| Arc::ptr_eq(v, &slot));
                        report.forgotten += 1;
                        continue;
                    }
                    match self.bind(&mut entry, now).await {
                        Ok(created) => {
                            info!(
                                id = created.submission.id,
                                batch = %key.batch_id,
                                attachments = created.submission.attachments.len(),
                                captioned = entry.body.is_some(),
                                "album finalized after quiet period"
                            );
                            drop(entry);
                            self.sink.announce(&created).await;
                            report.finalized.push(created);
                        }
                        Err(err) => {
                            warn!(batch = %key.batch_id, error = %err, "album finalization failed; keeping buffer for the next sweep");
                            report.failed += 1;
                        }
                    }
                }
                BatchState::Bound { bound_at, .. } if elapsed(bound_at, now) >= self.config.retention => {
                    self.batches.remove_if(&key, |_, v| Arc::ptr_eq(v, &slot));
                    report.forgotten += 1;
                }
                _ => {}
            }
        }

        let caption_wait = self.config.caption_wait;
        self.stash.retain(|submitter, media| {
            let keep = elapsed(media.stashed_at, now) < caption_wait;
            if !keep {
                info!(submitter, attachments = media.attachments.len(), "no caption followed; dropping stashed media");
            }
            keep
        });

        report
    }

    /// Runs [`Self::sweep`] every `every` until the handle is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = self.sweep().await;
                if !report.finalized.is_empty() || report.failed > 0 {
                    debug!(
                        finalized = report.finalized.len(),
                        failed = report.failed,
                        forgotten = report.forgotten,
                        "aggregator sweep"
                    );
                }
            }
        })
    }

    /// Keeps caption-less media until the submitter's next text message.
    /// Returns the number of attachments now waiting.
    pub fn stash(
        &self,
        submitter_id: UserId,
        attachments: &[Attachment],
        origin_attribution: Option<OriginAttribution>,
    ) -> usize {
        let now = self.clock.now();
        let mut media = self.stash.entry(submitter_id).or_insert_with(|| StashedMedia {
            attachments: Vec::new(),
            origin_attribution: None,
            stashed_at: now,
        });
        merge_attachments(&mut media.attachments, attachments);
        if media.origin_attribution.is_none() {
            media.origin_attribution = origin_attribution;
        }
        media.stashed_at = now;
        media.attachments.len()
    }

    pub fn take_stash(&self, submitter_id: UserId) -> Option<StashedMedia> {
        self.stash.remove(&submitter_id).map(|(_, media)| media)
    }

    /// Number of batches currently tracked.
    pub fn pending_batches(&self) -> usize {
        self.batches.len()
    }
}
