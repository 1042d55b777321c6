//! # Domain Models
//!
//! These structs represent the core entities of the newsroom pipeline.
//! Every submission lives inside one shared [`Document`], and its moderation
//! state is implied by which of the three partitions currently holds it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Numeric submission identifier, unique across all partitions for the
/// lifetime of the document.
pub type SubmissionId = u64;

/// Identity of a transport user (submitter, reactor or moderator).
pub type UserId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Photo,
    Video,
}

/// A media item attached to a submission. `reference` is the transport's
/// opaque file handle; the bytes themselves are never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub reference: String,
}

impl Attachment {
    pub fn photo(reference: impl Into<String>) -> Self {
        Self {
            kind: AttachmentKind::Photo,
            reference: reference.into(),
        }
    }

    pub fn video(reference: impl Into<String>) -> Self {
        Self {
            kind: AttachmentKind::Video,
            reference: reference.into(),
        }
    }
}

/// Appends `items` to `existing`, skipping anything already present by
/// `(kind, reference)`. Returns how many items were actually added.
pub fn merge_attachments(existing: &mut Vec<Attachment>, items: &[Attachment]) -> usize {
    let mut added = 0;
    for item in items {
        if item.reference.is_empty() || existing.contains(item) {
            continue;
        }
        existing.push(item.clone());
        added += 1;
    }
    added
}

/// Who sent a submission. Captured once at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submitter {
    pub id: UserId,
    pub name: String,
    pub handle: Option<String>,
}

/// Upstream source a submission was forwarded from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginAttribution {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub message_link: Option<String>,
}

impl OriginAttribution {
    /// Human-readable label: the title, else `@handle`.
    pub fn label(&self) -> Option<String> {
        self.title
            .clone()
            .or_else(|| self.handle.as_ref().map(|h| format!("@{h}")))
    }
}

/// Location of the moderation prompt that was sent for a pending submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationCorrelation {
    pub channel_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Dislike,
}

impl ReactionKind {
    pub fn opposite(self) -> Self {
        match self {
            ReactionKind::Like => ReactionKind::Dislike,
            ReactionKind::Dislike => ReactionKind::Like,
        }
    }
}

impl FromStr for ReactionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(ReactionKind::Like),
            "dislike" => Ok(ReactionKind::Dislike),
            other => Err(AppError::ValidationError(format!(
                "reaction type must be \"like\" or \"dislike\", got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionAction {
    Added,
    Removed,
}

/// Per-submission reaction ledger. Only published submissions carry one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reactions {
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub dislike_count: u64,
    #[serde(default)]
    pub by_user: BTreeMap<UserId, ReactionKind>,
}

impl Reactions {
    pub fn count(&self, kind: ReactionKind) -> u64 {
        match kind {
            ReactionKind::Like => self.like_count,
            ReactionKind::Dislike => self.dislike_count,
        }
    }

    pub fn counter_mut(&mut self, kind: ReactionKind) -> &mut u64 {
        match kind {
            ReactionKind::Like => &mut self.like_count,
            ReactionKind::Dislike => &mut self.dislike_count,
        }
    }
}

/// The moderation partition a submission currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Pending,
    Published,
    Rejected,
}

impl Partition {
    pub const ALL: [Partition; 3] = [Partition::Pending, Partition::Published, Partition::Rejected];
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Partition::Pending => "pending",
            Partition::Published => "published",
            Partition::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// One logical content item.
///
/// Every key is always serialized (absent values become `null` or `[]`) so
/// that re-normalizing a stored document is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: SubmissionId,
    #[serde(default)]
    pub body: String,
    pub submitter_id: UserId,
    #[serde(default)]
    pub submitter_name: String,
    #[serde(default)]
    pub submitter_handle: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub origin_attribution: Option<OriginAttribution>,
    /// Set once the moderation prompt is delivered; cleared on approve/reject.
    #[serde(default)]
    pub moderation_correlation: Option<ModerationCorrelation>,
    /// When the submission was approved or rejected. `None` for pending
    /// submissions and for privileged ones that skipped moderation.
    #[serde(default)]
    pub moderated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reactions: Option<Reactions>,
}

impl Submission {
    pub fn submitter(&self) -> Submitter {
        Submitter {
            id: self.submitter_id,
            name: self.submitter_name.clone(),
            handle: self.submitter_handle.clone(),
        }
    }

    pub fn first_photo(&self) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|a| a.kind == AttachmentKind::Photo)
    }

    /// Attachments are frozen from the first lifecycle transition onwards.
    /// A privileged submission created straight into `published` has had no
    /// transition yet, so its album may still be completing.
    pub fn accepts_attachments(&self, partition: Partition) -> bool {
        match partition {
            Partition::Pending => true,
            Partition::Published => self.moderated_at.is_none(),
            Partition::Rejected => false,
        }
    }
}

/// The single versioned blob every handler reads and mutates.
///
/// Top-level keys other than the three partitions belong to features outside
/// this pipeline; they are carried through every mutation untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub pending: Vec<Submission>,
    #[serde(default)]
    pub published: Vec<Submission>,
    #[serde(default)]
    pub rejected: Vec<Submission>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    pub fn partition(&self, partition: Partition) -> &Vec<Submission> {
        match partition {
            Partition::Pending => &self.pending,
            Partition::Published => &self.published,
            Partition::Rejected => &self.rejected,
        }
    }

    pub fn partition_mut(&mut self, partition: Partition) -> &mut Vec<Submission> {
        match partition {
            Partition::Pending => &mut self.pending,
            Partition::Published => &mut self.published,
            Partition::Rejected => &mut self.rejected,
        }
    }

    /// Finds which partition holds `id`, and at which index.
    pub fn locate(&self, id: SubmissionId) -> Option<(Partition, usize)> {
        Partition::ALL.into_iter().find_map(|p| {
            self.partition(p)
                .iter()
                .position(|s| s.id == id)
                .map(|idx| (p, idx))
        })
    }

    pub fn get(&self, id: SubmissionId) -> Option<(Partition, &Submission)> {
        let (partition, idx) = self.locate(id)?;
        Some((partition, &self.partition(partition)[idx]))
    }

    pub fn get_mut(&mut self, id: SubmissionId) -> Option<(Partition, &mut Submission)> {
        let (partition, idx) = self.locate(id)?;
        Some((partition, &mut self.partition_mut(partition)[idx]))
    }

    /// Removes `id` from whichever partition holds it.
    pub fn take(&mut self, id: SubmissionId) -> Option<(Partition, Submission)> {
        let (partition, idx) = self.locate(id)?;
        Some((partition, self.partition_mut(partition).remove(idx)))
    }

    /// Inserts at the head: partitions are kept newest-first.
    pub fn push_front(&mut self, partition: Partition, submission: Submission) {
        self.partition_mut(partition).insert(0, submission);
    }

    /// `max(existing ids) + 1` over all partitions, starting at 1.
    pub fn next_id(&self) -> SubmissionId {
        self.submissions()
            .map(|(_, s)| s.id)
            .max()
            .map_or(1, |max| max + 1)
    }

    pub fn submissions(&self) -> impl Iterator<Item = (Partition, &Submission)> + '_ {
        Partition::ALL
            .into_iter()
            .flat_map(move |p| self.partition(p).iter().map(move |s| (p, s)))
    }

    /// Ids that appear more than once across the three partitions. Always
    /// empty for a document that was only mutated through the pipeline.
    pub fn duplicate_ids(&self) -> Vec<SubmissionId> {
        let mut seen = BTreeMap::<SubmissionId, usize>::new();
        for (_, s) in self.submissions() {
            *seen.entry(s.id).or_default() += 1;
        }
        seen.into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(id, _)| id)
            .collect()
    }
}

/// A transport event as delivered by the chat adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeEvent {
    pub submitter_id: UserId,
    #[serde(default)]
    pub submitter_name: String,
    #[serde(default)]
    pub submitter_handle: Option<String>,
    /// Shared by every message of one album.
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub origin_attribution: Option<OriginAttribution>,
}

impl IntakeEvent {
    pub fn submitter(&self) -> Submitter {
        Submitter {
            id: self.submitter_id,
            name: self.submitter_name.trim().to_string(),
            handle: self
                .submitter_handle
                .as_deref()
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string),
        }
    }

    /// The trimmed caption or message text, if any.
    pub fn caption(&self) -> Option<&str> {
        self.body.as_deref().map(str::trim).filter(|b| !b.is_empty())
    }
}

/// Everything needed to create a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionDraft {
    pub body: String,
    pub submitter: Submitter,
    pub attachments: Vec<Attachment>,
    pub origin_attribution: Option<OriginAttribution>,
    pub privileged: bool,
}

/// Payload handed to the moderation transport when a submission enters
/// `pending`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationNotice {
    pub submission_id: SubmissionId,
    pub body: String,
    pub submitter_name: String,
    pub submitter_handle: Option<String>,
    pub first_attachment: Option<Attachment>,
    pub origin_attribution: Option<OriginAttribution>,
}

impl From<&Submission> for ModerationNotice {
    fn from(s: &Submission) -> Self {
        Self {
            submission_id: s.id,
            body: s.body.clone(),
            submitter_name: s.submitter_name.clone(),
            submitter_handle: s.submitter_handle.clone(),
            first_attachment: s.first_photo().or(s.attachments.first()).cloned(),
            origin_attribution: s.origin_attribution.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationAction {
    Approve,
    Reject,
}

impl ModerationAction {
    /// Partition a pending submission moves to under this action.
    pub fn target(self) -> Partition {
        match self {
            ModerationAction::Approve => Partition::Published,
            ModerationAction::Reject => Partition::Rejected,
        }
    }
}

impl FromStr for ModerationAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(ModerationAction::Approve),
            "reject" => Ok(ModerationAction::Reject),
            other => Err(AppError::ValidationError(format!(
                "unknown moderation action {other:?}"
            ))),
        }
    }
}

/// Outcome of a successful approve/reject.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: ModerationAction,
    pub submission: Submission,
    /// The correlation that was cleared by the transition, for the transport
    /// adapter to finalize the prompt.
    pub correlation: Option<ModerationCorrelation>,
}

/// Outcome of a successful delete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Removal {
    pub partition: Partition,
    pub submission: Submission,
}
