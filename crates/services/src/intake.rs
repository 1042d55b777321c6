//! # Intake
//!
//! Entry point for transport events. Routes each event to the album
//! aggregator, the caption stash, or straight to the publisher.

use std::sync::Arc;

use domains::{
    merge_attachments, AppError, AuthProvider, IntakeEvent, Partition, Result, Submission,
    SubmissionDraft,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::aggregator::{AggregationOutcome, BatchEvent, BatchKey, MediaAggregator};
use crate::publisher::Publisher;
use crate::submissions::CreatedSubmission;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntakeStatus {
    Published,
    Pending,
    /// Held by the aggregator or the caption stash.
    Buffered,
    /// Added to an album that already has a submission.
    Appended,
}

/// Acknowledgement relayed back to the submitter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntakeReceipt {
    pub status: IntakeStatus,
    pub submission: Option<Submission>,
}

impl IntakeReceipt {
    fn created(created: CreatedSubmission) -> Self {
        let status = match created.partition {
            Partition::Published => IntakeStatus::Published,
            _ => IntakeStatus::Pending,
        };
        Self {
            status,
            submission: Some(created.submission),
        }
    }

    fn without_submission(status: IntakeStatus) -> Self {
        Self {
            status,
            submission: None,
        }
    }
}

pub struct Intake {
    publisher: Arc<Publisher>,
    aggregator: Arc<MediaAggregator>,
    auth: Arc<dyn AuthProvider>,
}

impl Intake {
    /// `aggregator` is expected to hand its batches to `publisher`.
    pub fn new(publisher: Arc<Publisher>, aggregator: Arc<MediaAggregator>, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            publisher,
            aggregator,
            auth,
        }
    }

    pub fn aggregator(&self) -> &Arc<MediaAggregator> {
        &self.aggregator
    }

    /// * batch id present: the event belongs to an album;
    /// * media without text: stashed until the submitter's next text message;
    /// * text: created right away, together with any stashed media if the
    ///   event carries no media of its own.
    pub async fn accept(&self, event: IntakeEvent) -> Result<IntakeReceipt> {
        let caption = event.caption().map(str::to_string);
        if caption.is_none() && event.attachments.is_empty() {
            return Err(AppError::ValidationError(
                "intake event has neither text nor attachments".into(),
            ));
        }
        let submitter = event.submitter();
        let privileged = self.auth.is_privileged(&submitter);

        if let Some(batch_id) = event.batch_id.filter(|b| !b.trim().is_empty()) {
            let key = BatchKey {
                submitter_id: submitter.id,
                batch_id,
            };
            let outcome = self
                .aggregator
                .on_event(
                    key,
                    BatchEvent {
                        submitter,
                        privileged,
                        attachments: event.attachments,
                        caption,
                        origin_attribution: event.origin_attribution,
                    },
                )
                .await?;
            return Ok(match outcome {
                AggregationOutcome::Buffered { .. } => IntakeReceipt::without_submission(IntakeStatus::Buffered),
                AggregationOutcome::Created(created) => IntakeReceipt::created(created),
                AggregationOutcome::Appended { .. } => IntakeReceipt::without_submission(IntakeStatus::Appended),
            });
        }

        let Some(body) = caption else {
            let waiting = self
                .aggregator
                .stash(submitter.id, &event.attachments, event.origin_attribution);
            debug!(submitter = submitter.id, waiting, "media stashed until a caption follows");
            return Ok(IntakeReceipt::without_submission(IntakeStatus::Buffered));
        };

        let stashed = if event.attachments.is_empty() {
            self.aggregator.take_stash(submitter.id)
        } else {
            None
        };
        let mut attachments = Vec::new();
        let mut origin_attribution = event.origin_attribution;
        if let Some(media) = &stashed {
            merge_attachments(&mut attachments, &media.attachments);
            origin_attribution = origin_attribution.or_else(|| media.origin_attribution.clone());
        }
        merge_attachments(&mut attachments, &event.attachments);

        let draft = SubmissionDraft {
            body,
            submitter: submitter.clone(),
            attachments,
            origin_attribution,
            privileged,
        };
        match self.publisher.publish(draft).await {
            Ok(created) => Ok(IntakeReceipt::created(created)),
            Err(err) => {
                if let Some(media) = stashed {
                    warn!(submitter = submitter.id, error = %err, "creation failed; restoring stashed media");
                    self.aggregator
                        .stash(submitter.id, &media.attachments, media.origin_attribution);
                }
                Err(err)
            }
        }
    }
}
