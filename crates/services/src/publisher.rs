use std::sync::Arc;

use async_trait::async_trait;
use domains::{
    Attachment, ModerationNotice, ModerationNotifier, Partition, Result, SubmissionDraft,
    SubmissionId,
};
use tracing::{debug, warn};

use crate::aggregator::SubmissionSink;
use crate::submissions::{CreatedSubmission, SubmissionRepository};

/// Creates submissions and puts pending ones in front of a moderator.
///
/// A notifier failure never undoes the creation: the submission simply stays
/// pending without a correlation and can still be moderated by id.
pub struct Publisher {
    repo: Arc<SubmissionRepository>,
    notifier: Option<Arc<dyn ModerationNotifier>>,
}

impl Publisher {
    pub fn new(repo: Arc<SubmissionRepository>, notifier: Option<Arc<dyn ModerationNotifier>>) -> Self {
        Self { repo, notifier }
    }

    pub fn repository(&self) -> &Arc<SubmissionRepository> {
        &self.repo
    }

    pub async fn publish(&self, draft: SubmissionDraft) -> Result<CreatedSubmission> {
        let created = self.repo.create(draft).await?;
        self.request_moderation(&created).await;
        Ok(created)
    }

    /// Runs after the creation has committed, so failures are only logged.
    /// Published submissions need no prompt.
    async fn request_moderation(&self, created: &CreatedSubmission) {
        if created.partition != Partition::Pending {
            return;
        }
        let Some(notifier) = &self.notifier else {
            return;
        };
        let id = created.submission.id;
        let notice = ModerationNotice::from(&created.submission);
        match notifier.notify(&notice).await {
            Ok(correlation) => match self.repo.attach_moderation_correlation(id, correlation).await {
                Ok(attached) => {
                    debug!(id, attached, message_id = correlation.message_id, "moderation prompt delivered")
                }
                Err(err) => warn!(id, error = %err, "prompt delivered but its correlation was not stored"),
            },
            Err(err) => warn!(id, error = %err, "could not deliver moderation prompt"),
        }
    }
}

#[async_trait]
impl SubmissionSink for Publisher {
    /// The prompt goes out in [`SubmissionSink::announce`].
    async fn create(&self, draft: SubmissionDraft) -> Result<CreatedSubmission> {
        self.repo.create(draft).await
    }

    async fn append(&self, id: SubmissionId, items: &[Attachment]) -> Result<bool> {
        self.repo.append_attachments(id, items).await
    }

    async fn announce(&self, created: &CreatedSubmission) {
        self.request_moderation(created).await;
    }
}
