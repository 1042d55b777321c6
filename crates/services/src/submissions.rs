//! # SubmissionRepository
//!
//! Owns the three partitions of the document, id assignment and the
//! moderation-prompt correlation. Every mutation is a mutator passed to
//! [`VersionedStore::update_document`].

use std::sync::Arc;

use domains::{
    merge_attachments, Attachment, Clock, ModerationCorrelation, Partition, Reactions, Removal,
    Result, Submission, SubmissionDraft, SubmissionId,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::store::VersionedStore;

/// A freshly created submission and where it was placed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedSubmission {
    pub partition: Partition,
    pub submission: Submission,
}

pub struct SubmissionRepository {
    store: Arc<VersionedStore>,
    clock: Arc<dyn Clock>,
}

impl SubmissionRepository {
    pub fn new(store: Arc<VersionedStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<VersionedStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Assigns the next id and inserts at the head of `published` for
    /// privileged submitters, `pending` otherwise.
    pub async fn create(&self, draft: SubmissionDraft) -> Result<CreatedSubmission> {
        let created_at = self.clock.now();
        let partition = if draft.privileged {
            Partition::Published
        } else {
            Partition::Pending
        };
        let mut attachments = Vec::with_capacity(draft.attachments.len());
        merge_attachments(&mut attachments, &draft.attachments);
        let body = draft.body.trim().to_string();

        let submission = self
            .store
            .update_document(|doc| {
                let submission = Submission {
                    id: doc.next_id(),
                    body: body.clone(),
                    submitter_id: draft.submitter.id,
                    submitter_name: draft.submitter.name.clone(),
                    submitter_handle: draft.submitter.handle.clone(),
                    created_at,
                    attachments: attachments.clone(),
                    origin_attribution: draft.origin_attribution.clone(),
                    moderation_correlation: None,
                    moderated_at: None,
                    reactions: draft.privileged.then(Reactions::default),
                };
                doc.push_front(partition, submission.clone());
                Ok(submission)
            })
            .await?;

        self.store.metrics().record_created(partition);
        info!(
            id = submission.id,
            %partition,
            submitter = submission.submitter_id,
            attachments = submission.attachments.len(),
            "submission created"
        );
        Ok(CreatedSubmission {
            partition,
            submission,
        })
    }

    /// Records where the moderation prompt landed. Returns `false` when the
    /// submission is no longer pending.
    pub async fn attach_moderation_correlation(
        &self,
        id: SubmissionId,
        correlation: ModerationCorrelation,
    ) -> Result<bool> {
        let attached = self
            .store
            .update_document(|doc| {
                match doc.pending.iter_mut().find(|s| s.id == id) {
                    Some(submission) => {
                        submission.moderation_correlation = Some(correlation);
                        Ok(true)
                    }
                    None => Ok(false),
                }
            })
            .await?;
        if !attached {
            debug!(id, "submission left pending before its prompt was recorded");
        }
        Ok(attached)
    }

    /// Merges `items` into the submission, deduplicating by
    /// `(kind, reference)`. Returns `false` if the submission is gone or its
    /// attachments are frozen.
    pub async fn append_attachments(&self, id: SubmissionId, items: &[Attachment]) -> Result<bool> {
        let outcome = self
            .store
            .update_document(|doc| {
                let Some((partition, submission)) = doc.get_mut(id) else {
                    return Ok(None);
                };
                if !submission.accepts_attachments(partition) {
                    return Ok(Some((partition, None)));
                }
                let added = merge_attachments(&mut submission.attachments, items);
                Ok(Some((partition, Some(added))))
            })
            .await?;

        match outcome {
            None => {
                debug!(id, "cannot append attachments: submission not found");
                Ok(false)
            }
            Some((partition, None)) => {
                info!(id, %partition, "attachments are frozen; dropping late album items");
                Ok(false)
            }
            Some((partition, Some(added))) => {
                debug!(id, %partition, added, "attachments appended");
                Ok(true)
            }
        }
    }

    /// Resolves a moderation prompt back to its submission. Falls back to a
    /// `#<digits>` marker in the prompt text when no submission carries the
    /// correlation (e.g. after it was cleared by a decision).
    pub async fn find_by_correlation(
        &self,
        channel_id: i64,
        message_id: i64,
        message_text: Option<&str>,
    ) -> Result<Option<SubmissionId>> {
        let (doc, _) = self.store.read().await?;
        let structural = doc.submissions().find_map(|(_, s)| {
            s.moderation_correlation
                .filter(|c| c.channel_id == channel_id && c.message_id == message_id)
                .map(|_| s.id)
        });
        Ok(structural.or_else(|| message_text.and_then(extract_embedded_id)))
    }

    /// Removes `id` from whichever partition holds it.
    pub async fn delete(&self, id: SubmissionId) -> Result<Option<Removal>> {
        let removal = self
            .store
            .update_document(|doc| {
                Ok(doc
                    .take(id)
                    .map(|(partition, submission)| Removal {
                        partition,
                        submission,
                    }))
            })
            .await?;
        match &removal {
            Some(r) => info!(id, partition = %r.partition, "submission deleted"),
            None => debug!(id, "delete requested for unknown submission"),
        }
        Ok(removal)
    }

    /// Looks a submission up in the cached snapshot.
    pub async fn get(&self, id: SubmissionId) -> Result<Option<(Partition, Submission)>> {
        let doc = self.store.snapshot().await?;
        Ok(doc.get(id).map(|(p, s)| (p, s.clone())))
    }
}

/// First `#<digits>` in `text`, e.g. `"New submission #42 from Ana"`.
pub fn extract_embedded_id(text: &str) -> Option<SubmissionId> {
    text.match_indices('#').find_map(|(idx, _)| {
        let digits: String = text[idx + 1..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    })
}
