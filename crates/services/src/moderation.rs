//! # Moderation
//!
//! [`ModerationWorkflow`] is the state machine: `pending -> published`,
//! `pending -> rejected`, and delete from anywhere. A decision on a
//! submission that is no longer pending is a normal `None`, since two
//! moderators clicking the same prompt is expected.
//!
//! [`ModerationDesk`] adds the transport side effects: finalizing or
//! retracting the prompt once the document change has committed.

use std::sync::Arc;

use domains::{
    Clock, Decision, ModerationAction, ModerationNotifier, Reactions, Removal, Result, SubmissionId,
};
use tracing::{info, warn};

use crate::submissions::SubmissionRepository;

/// What a moderator acted on: a submission id, or the prompt they replied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationTarget {
    Submission(SubmissionId),
    Message {
        channel_id: i64,
        message_id: i64,
        text: Option<String>,
    },
}

pub struct ModerationWorkflow {
    repo: Arc<SubmissionRepository>,
}

impl ModerationWorkflow {
    pub fn new(repo: Arc<SubmissionRepository>) -> Self {
        Self { repo }
    }

    pub async fn approve(&self, id: SubmissionId) -> Result<Option<Decision>> {
        self.decide(id, ModerationAction::Approve).await
    }

    pub async fn reject(&self, id: SubmissionId) -> Result<Option<Decision>> {
        self.decide(id, ModerationAction::Reject).await
    }

    /// Moves `id` out of `pending` to the head of the action's partition and
    /// clears its correlation. `None` if `id` is not pending.
    pub async fn decide(&self, id: SubmissionId, action: ModerationAction) -> Result<Option<Decision>> {
        let decided_at = self.repo.clock().now();
        let decision = self
            .repo
            .store()
            .update_document(|doc| {
                let Some(idx) = doc.pending.iter().position(|s| s.id == id) else {
                    return Ok(None);
                };
                let mut submission = doc.pending.remove(idx);
                let correlation = submission.moderation_correlation.take();
                submission.moderated_at = Some(decided_at);
                submission.reactions = match action {
                    ModerationAction::Approve => Some(submission.reactions.take().unwrap_or_default()),
                    ModerationAction::Reject => None,
                };
                doc.push_front(action.target(), submission.clone());
                Ok(Some(Decision {
                    action,
                    submission,
                    correlation,
                }))
            })
            .await?;

        match &decision {
            Some(_) => {
                self.repo.store().metrics().record_decision(action);
                info!(id, ?action, "submission moderated");
            }
            None => info!(id, ?action, "submission is not pending; ignoring duplicate moderation"),
        }
        Ok(decision)
    }

    pub async fn delete(&self, id: SubmissionId) -> Result<Option<Removal>> {
        self.repo.delete(id).await
    }

    pub async fn resolve(&self, target: &ModerationTarget) -> Result<Option<SubmissionId>> {
        match target {
            ModerationTarget::Submission(id) => Ok(Some(*id)),
            ModerationTarget::Message {
                channel_id,
                message_id,
                text,
            } => {
                self.repo
                    .find_by_correlation(*channel_id, *message_id, text.as_deref())
                    .await
            }
        }
    }
}

pub struct ModerationDesk {
    workflow: ModerationWorkflow,
    notifier: Option<Arc<dyn ModerationNotifier>>,
}

impl ModerationDesk {
    pub fn new(workflow: ModerationWorkflow, notifier: Option<Arc<dyn ModerationNotifier>>) -> Self {
        Self { workflow, notifier }
    }

    pub fn workflow(&self) -> &ModerationWorkflow {
        &self.workflow
    }

    /// Resolves the target, applies the transition and finalizes the prompt.
    pub async fn moderate(&self, action: ModerationAction, target: &ModerationTarget) -> Result<Option<Decision>> {
        let Some(id) = self.workflow.resolve(target).await? else {
            info!(?target, "moderation target does not resolve to a submission");
            return Ok(None);
        };
        let decision = self.workflow.decide(id, action).await?;

        if let (Some(notifier), Some(correlation)) = (
            &self.notifier,
            decision.as_ref().and_then(|d| d.correlation),
        ) {
            if let Err(err) = notifier.finalize(&correlation, action).await {
                warn!(id, error = %err, "could not finalize moderation prompt");
            }
        }
        Ok(decision)
    }

    /// Deletes the target from whichever partition holds it and retracts its
    /// prompt, if one is still recorded.
    pub async fn delete(&self, target: &ModerationTarget) -> Result<Option<Removal>> {
        let Some(id) = self.workflow.resolve(target).await? else {
            return Ok(None);
        };
        let removal = self.workflow.delete(id).await?;

        if let (Some(notifier), Some(correlation)) = (
            &self.notifier,
            removal.as_ref().and_then(|r| r.submission.moderation_correlation),
        ) {
            if let Err(err) = notifier.retract(&correlation).await {
                warn!(id, error = %err, "could not retract moderation prompt");
            }
        }
        Ok(removal)
    }
}
