//! Read side: the published feed, served from the store's snapshot cache.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domains::{
    AppError, Attachment, OriginAttribution, ReactionKind, Result, Submission, SubmissionId, UserId,
};
use serde::Serialize;

use crate::store::VersionedStore;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedQuery {
    /// 1-based.
    page: u32,
    per_page: u32,
    /// Whose reaction to report as `myReaction`.
    user_id: Option<UserId>,
}

impl FeedQuery {
    pub fn new(page: Option<u32>, per_page: Option<u32>, user_id: Option<UserId>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
            user_id,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: SubmissionId,
    pub body: String,
    pub submitter_name: String,
    pub submitter_handle: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<Attachment>,
    pub origin_attribution: Option<OriginAttribution>,
    pub like_count: u64,
    pub dislike_count: u64,
    pub my_reaction: Option<ReactionKind>,
}

impl FeedItem {
    fn project(submission: &Submission, user_id: Option<UserId>) -> Self {
        let reactions = submission.reactions.as_ref();
        Self {
            id: submission.id,
            body: submission.body.clone(),
            submitter_name: submission.submitter_name.clone(),
            submitter_handle: submission.submitter_handle.clone(),
            created_at: submission.created_at,
            attachments: submission.attachments.clone(),
            origin_attribution: submission.origin_attribution.clone(),
            like_count: reactions.map_or(0, |r| r.count(ReactionKind::Like)),
            dislike_count: reactions.map_or(0, |r| r.count(ReactionKind::Dislike)),
            my_reaction: user_id
                .zip(reactions)
                .and_then(|(user, r)| r.by_user.get(&user).copied()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub page: u32,
    pub per_page: u32,
    pub total: usize,
    pub has_more: bool,
}

pub struct Feed {
    store: Arc<VersionedStore>,
}

impl Feed {
    pub fn new(store: Arc<VersionedStore>) -> Self {
        Self { store }
    }

    /// Published submissions, newest id first.
    pub async fn page(&self, query: FeedQuery) -> Result<FeedPage> {
        let doc = self.store.snapshot().await?;
        let mut published: Vec<&Submission> = doc.published.iter().collect();
        published.sort_unstable_by(|a, b| b.id.cmp(&a.id));

        let total = published.len();
        let page = query.page.max(1);
        let per_page = query.per_page.clamp(1, MAX_PER_PAGE);
        let start = (page as usize - 1).saturating_mul(per_page as usize);
        let items: Vec<FeedItem> = published
            .into_iter()
            .skip(start)
            .take(per_page as usize)
            .map(|s| FeedItem::project(s, query.user_id))
            .collect();
        let has_more = start + items.len() < total;

        Ok(FeedPage {
            items,
            page,
            per_page,
            total,
            has_more,
        })
    }

    pub async fn item(&self, id: SubmissionId, user_id: Option<UserId>) -> Result<FeedItem> {
        let doc = self.store.snapshot().await?;
        doc.published
            .iter()
            .find(|s| s.id == id)
            .map(|s| FeedItem::project(s, user_id))
            .ok_or_else(|| AppError::NotFound("Submission".into(), id.to_string()))
    }
}
