//! Shared fixtures for the end-to-end tests: a fully wired pipeline over the
//! in-memory backend, a manual clock and a notifier that records every call.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use auth_adapters::StaticAuthProvider;
use domains::{
    Attachment, IntakeEvent, ModerationAction, ModerationCorrelation, ModerationNotice, ModerationNotifier,
    UserId,
};
use prometheus_client::registry::Registry;
use services::{
    AggregatorConfig, Feed, Intake, ManualClock, MediaAggregator, ModerationDesk, ModerationWorkflow,
    PipelineMetrics, Publisher, ReactionLedger, RetryPolicy, SubmissionRepository, VersionedStore,
};
use storage_adapters::InMemoryBackend;

/// Submitter id the harness treats as an admin.
pub const ADMIN_ID: UserId = 99;
pub const MODERATION_CHAT: i64 = -1001;
pub const MODERATOR_PASSWORD: &str = "letmein";
pub const INTAKE_KEY: &str = "bridge-relay";

/// Records prompts and hands out increasing message ids.
#[derive(Default)]
pub struct RecordingNotifier {
    next_message_id: AtomicI64,
    notices: Mutex<Vec<ModerationNotice>>,
    finalized: Mutex<Vec<(ModerationCorrelation, ModerationAction)>>,
    retracted: Mutex<Vec<ModerationCorrelation>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<ModerationNotice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn finalized(&self) -> Vec<(ModerationCorrelation, ModerationAction)> {
        self.finalized.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn retracted(&self) -> Vec<ModerationCorrelation> {
        self.retracted.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ModerationNotifier for RecordingNotifier {
    async fn notify(&self, notice: &ModerationNotice) -> anyhow::Result<ModerationCorrelation> {
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.notices
            .lock()
            .map_err(|_| anyhow::anyhow!("notice log poisoned"))?
            .push(notice.clone());
        Ok(ModerationCorrelation {
            channel_id: MODERATION_CHAT,
            message_id,
        })
    }

    async fn finalize(&self, correlation: &ModerationCorrelation, action: ModerationAction) -> anyhow::Result<()> {
        self.finalized
            .lock()
            .map_err(|_| anyhow::anyhow!("finalize log poisoned"))?
            .push((*correlation, action));
        Ok(())
    }

    async fn retract(&self, correlation: &ModerationCorrelation) -> anyhow::Result<()> {
        self.retracted
            .lock()
            .map_err(|_| anyhow::anyhow!("retract log poisoned"))?
            .push(*correlation);
        Ok(())
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::exponential(max_attempts, Duration::from_millis(1)).with_max_delay(Duration::from_millis(8))
}

/// One fully wired pipeline.
pub struct Harness {
    pub backend: Arc<InMemoryBackend>,
    pub store: Arc<VersionedStore>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub repo: Arc<SubmissionRepository>,
    pub publisher: Arc<Publisher>,
    pub aggregator: Arc<MediaAggregator>,
    pub intake: Arc<Intake>,
    pub desk: Arc<ModerationDesk>,
    pub feed: Arc<Feed>,
    pub reactions: Arc<ReactionLedger>,
    pub auth: Arc<StaticAuthProvider>,
    pub registry: Arc<Registry>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_retry(fast_retry(64))
    }

    pub fn with_retry(retry: RetryPolicy) -> Self {
        let backend = Arc::new(InMemoryBackend::new());
        let metrics = PipelineMetrics::default();
        let mut registry = Registry::default();
        metrics.register(&mut registry);

        let store = Arc::new(VersionedStore::new(backend.clone()).with_retry(retry).with_metrics(metrics));
        let clock = Arc::new(ManualClock::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let repo = Arc::new(SubmissionRepository::new(store.clone(), clock.clone()));
        let prompts: Arc<dyn ModerationNotifier> = notifier.clone();
        let publisher = Arc::new(Publisher::new(repo.clone(), Some(prompts.clone())));
        let aggregator = Arc::new(MediaAggregator::new(
            publisher.clone(),
            clock.clone(),
            AggregatorConfig::default(),
        ));

        let moderator_hash = auth_adapters::hash_password(MODERATOR_PASSWORD).unwrap_or_default();
        let intake_hash = auth_adapters::hash_password(INTAKE_KEY).unwrap_or_default();
        let auth = Arc::new(
            StaticAuthProvider::new(["@NewsDesk"], [ADMIN_ID])
                .with_moderator_hash(moderator_hash)
                .with_intake_hash(intake_hash),
        );

        Self {
            intake: Arc::new(Intake::new(publisher.clone(), aggregator.clone(), auth.clone())),
            desk: Arc::new(ModerationDesk::new(
                ModerationWorkflow::new(repo.clone()),
                Some(prompts),
            )),
            feed: Arc::new(Feed::new(store.clone())),
            reactions: Arc::new(ReactionLedger::new(store.clone())),
            registry: Arc::new(registry),
            backend,
            store,
            clock,
            notifier,
            repo,
            publisher,
            aggregator,
            auth,
        }
    }

    #[cfg(feature = "web-axum")]
    pub fn router(&self) -> axum::Router {
        api_adapters::router(api_adapters::AppState {
            feed: self.feed.clone(),
            reactions: self.reactions.clone(),
            intake: self.intake.clone(),
            desk: self.desk.clone(),
            auth: self.auth.clone(),
            registry: self.registry.clone(),
        })
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn text_event(submitter_id: UserId, body: &str) -> IntakeEvent {
    IntakeEvent {
        submitter_id,
        submitter_name: format!("user {submitter_id}"),
        submitter_handle: None,
        batch_id: None,
        body: Some(body.to_string()),
        attachments: Vec::new(),
        origin_attribution: None,
    }
}

pub fn media_event(submitter_id: UserId, attachments: Vec<Attachment>) -> IntakeEvent {
    IntakeEvent {
        body: None,
        attachments,
        ..text_event(submitter_id, "")
    }
}

/// One album message; `caption` is usually set on a single item only.
pub fn album_event(submitter_id: UserId, batch: &str, attachment: Attachment, caption: Option<&str>) -> IntakeEvent {
    IntakeEvent {
        batch_id: Some(batch.to_string()),
        body: caption.map(str::to_string),
        attachments: vec![attachment],
        ..text_event(submitter_id, "")
    }
}
