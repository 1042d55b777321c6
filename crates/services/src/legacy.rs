//! # Legacy document import
//!
//! Older deployments stored approved items under `posts` with a flatter,
//! author-centric record. [`normalize_legacy`] turns either shape into a
//! current [`Document`]; items already in the current shape are taken as
//! they are, so normalizing twice changes nothing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use domains::{
    merge_attachments, AppError, Attachment, AttachmentKind, Document, ModerationCorrelation,
    OriginAttribution, Partition, ReactionKind, Reactions, Result, Submission, SubmissionId, UserId,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyPost {
    id: SubmissionId,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    author_id: Option<UserId>,
    #[serde(default)]
    author_name: Option<String>,
    #[serde(default)]
    author_username: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    media: Vec<LegacyMedia>,
    #[serde(default)]
    photo_file_id: Option<String>,
    #[serde(default)]
    source: Option<LegacySource>,
    #[serde(default)]
    moderation_message: Option<LegacyModerationMessage>,
    #[serde(default)]
    source_type: Option<String>,
    #[serde(default)]
    likes: Option<i64>,
    #[serde(default)]
    dislikes: Option<i64>,
    #[serde(default)]
    user_reactions: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyMedia {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    file_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacySource {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    post_url: Option<String>,
    #[serde(default)]
    chat_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyModerationMessage {
    #[serde(default)]
    chat_id: Option<i64>,
    #[serde(default)]
    message_id: Option<i64>,
}

impl LegacyPost {
    fn into_submission(self, partition: Partition) -> Result<Submission> {
        let created_at = self.created_at.or(self.timestamp).ok_or_else(|| {
            AppError::ValidationError(format!("legacy post {} has no timestamp", self.id))
        })?;

        let mut attachments = Vec::new();
        let media: Vec<Attachment> = self
            .media
            .into_iter()
            .filter_map(|m| {
                let kind = match m.kind.as_str() {
                    "photo" => AttachmentKind::Photo,
                    "video" => AttachmentKind::Video,
                    _ => return None,
                };
                Some(Attachment {
                    kind,
                    reference: m.file_id,
                })
            })
            .collect();
        merge_attachments(&mut attachments, &media);
        if let Some(photo) = self.photo_file_id {
            merge_attachments(&mut attachments, &[Attachment::photo(photo)]);
        }

        let origin_attribution = self.source.map(|s| OriginAttribution {
            title: s.title,
            handle: s.username,
            message_link: s.post_url.or(s.chat_url),
        });

        // Correlations only make sense while a prompt is still open.
        let moderation_correlation = match (partition, self.moderation_message) {
            (
                Partition::Pending,
                Some(LegacyModerationMessage {
                    chat_id: Some(channel_id),
                    message_id: Some(message_id),
                }),
            ) => Some(ModerationCorrelation {
                channel_id,
                message_id,
            }),
            _ => None,
        };

        let moderated_at = match partition {
            Partition::Pending => None,
            Partition::Rejected => Some(created_at),
            Partition::Published => (self.source_type.as_deref() != Some("admin")).then_some(created_at),
        };

        let reactions = (partition == Partition::Published).then(|| {
            let by_user: BTreeMap<UserId, ReactionKind> = self
                .user_reactions
                .iter()
                .filter_map(|(user, kind)| Some((user.parse().ok()?, kind.parse().ok()?)))
                .collect();
            Reactions {
                like_count: self.likes.unwrap_or(0).max(0) as u64,
                dislike_count: self.dislikes.unwrap_or(0).max(0) as u64,
                by_user,
            }
        });

        Ok(Submission {
            id: self.id,
            body: self.text.unwrap_or_default().trim().to_string(),
            submitter_id: self.author_id.unwrap_or_default(),
            submitter_name: self.author_name.unwrap_or_default(),
            submitter_handle: self.author_username.filter(|h| !h.is_empty()),
            created_at,
            attachments,
            origin_attribution,
            moderation_correlation,
            moderated_at,
            reactions,
        })
    }
}

fn is_current(item: &Map<String, Value>) -> bool {
    item.contains_key("submitterId")
}

fn normalize_item(item: Value, partition: Partition) -> Result<Submission> {
    let Value::Object(fields) = item else {
        return Err(AppError::ValidationError(format!(
            "{partition} entry is not an object"
        )));
    };
    let current = is_current(&fields);
    let value = Value::Object(fields);
    if current {
        return serde_json::from_value(value)
            .map_err(|e| AppError::ValidationError(format!("malformed {partition} entry: {e}")));
    }
    let legacy: LegacyPost = serde_json::from_value(value)
        .map_err(|e| AppError::ValidationError(format!("malformed legacy {partition} entry: {e}")))?;
    legacy.into_submission(partition)
}

fn take_items(root: &mut Map<String, Value>, key: &str) -> Result<Vec<Value>> {
    match root.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(AppError::ValidationError(format!("`{key}` must be an array"))),
    }
}

/// Converts a stored document of either shape into the current one.
///
/// `posts` is folded into `published`. Any other top-level key is kept
/// untouched. Fails if an id ends up in more than one partition.
pub fn normalize_legacy(value: Value) -> Result<Document> {
    let Value::Object(mut root) = value else {
        return Err(AppError::ValidationError("document root must be an object".into()));
    };

    let mut published_items = take_items(&mut root, "published")?;
    let legacy_posts = take_items(&mut root, "posts")?;
    if !legacy_posts.is_empty() {
        debug!(count = legacy_posts.len(), "folding legacy posts into published");
    }
    published_items.extend(legacy_posts);

    let mut doc = Document::default();
    for (partition, items) in [
        (Partition::Pending, take_items(&mut root, "pending")?),
        (Partition::Published, published_items),
        (Partition::Rejected, take_items(&mut root, "rejected")?),
    ] {
        let normalized = items
            .into_iter()
            .map(|item| normalize_item(item, partition))
            .collect::<Result<Vec<_>>>()?;
        *doc.partition_mut(partition) = normalized;
    }
    doc.extra = root;

    let duplicates = doc.duplicate_ids();
    if !duplicates.is_empty() {
        return Err(AppError::ValidationError(format!(
            "ids present in more than one place: {duplicates:?}"
        )));
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy_document() -> Value {
        json!({
            "posts": [{
                "id": 3,
                "text": " Road closed on Main St ",
                "authorId": 42,
                "authorName": "Ana Ruiz",
                "authorUsername": "ana",
                "createdAt": "2024-05-01T10:00:00.000Z",
                "category": "all",
                "media": [{ "type": "photo", "fileId": "p1" }, { "type": "document", "fileId": "d1" }],
                "photoFileId": "p1",
                "source": { "title": "City News", "username": "citynews", "postUrl": "https://t.me/citynews/9" },
                "moderationMessage": { "chatId": -100, "messageId": 5 },
                "status": "approved",
                "sourceType": "user",
                "likes": 2,
                "dislikes": 0,
                "userReactions": { "7": "like", "8": "like", "x": "like" }
            }],
            "pending": [{
                "id": 4,
                "text": "Water outage",
                "authorId": 43,
                "authorName": "Luis",
                "timestamp": "2024-05-02T10:00:00Z",
                "moderationMessage": { "chatId": -100, "messageId": 6 }
            }],
            "rejected": [],
            "businesses": [{ "id": 1, "name": "Bakery" }]
        })
    }

    #[test]
    fn legacy_posts_become_published_submissions() {
        let doc = normalize_legacy(legacy_document()).unwrap();

        let published = &doc.published[0];
        assert_eq!(published.body, "Road closed on Main St");
        assert_eq!(published.submitter_handle.as_deref(), Some("ana"));
        assert_eq!(published.attachments, vec![Attachment::photo("p1")]);
        assert_eq!(
            published.origin_attribution.as_ref().and_then(|o| o.message_link.as_deref()),
            Some("https://t.me/citynews/9")
        );
        assert!(published.moderation_correlation.is_none());
        assert!(published.moderated_at.is_some());
        let reactions = published.reactions.as_ref().unwrap();
        assert_eq!(reactions.like_count, 2);
        assert_eq!(reactions.by_user.len(), 2);

        let pending = &doc.pending[0];
        assert_eq!(
            pending.moderation_correlation,
            Some(ModerationCorrelation {
                channel_id: -100,
                message_id: 6
            })
        );
        assert!(pending.reactions.is_none());
        assert!(doc.extra.contains_key("businesses"));
        assert!(!doc.extra.contains_key("posts"));
    }

    #[test]
    fn normalizing_twice_is_a_no_op() {
        let once = normalize_legacy(legacy_document()).unwrap();
        let twice = normalize_legacy(serde_json::to_value(&once).unwrap()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn duplicate_ids_are_refused() {
        let raw = json!({
            "posts": [{ "id": 1, "createdAt": "2024-05-01T10:00:00Z" }],
            "pending": [{ "id": 1, "createdAt": "2024-05-01T10:00:00Z" }]
        });
        assert!(matches!(normalize_legacy(raw), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn rejects_non_object_roots() {
        assert!(normalize_legacy(json!([])).is_err());
        assert!(normalize_legacy(json!({ "pending": 3 })).is_err());
    }
}
