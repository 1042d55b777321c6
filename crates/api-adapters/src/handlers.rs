//! # api-adapters Handlers
//!
//! Thin translation between HTTP and the services. Validation that the
//! services already perform is not repeated here.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use domains::{AppError, IntakeEvent, ModerationAction, Partition, Submission, SubmissionId, UserId};
use prometheus_client::encoding::text::encode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use services::{FeedItem, FeedPage, FeedQuery, IntakeReceipt, ModerationTarget, ReactionOutcome};
use tracing::info;

use crate::error::ApiError;
use crate::middleware::{INTAKE_KEY_HEADER, MODERATOR_KEY_HEADER};
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let mut body = String::new();
    encode(&mut body, &state.registry)
        .map_err(|e| AppError::Internal(format!("metrics encoding failed: {e}")))?;
    Ok((
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        body,
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub user_id: Option<UserId>,
}

/// Published feed, newest first.
pub async fn list_news(State(state): State<AppState>, Query(q): Query<NewsQuery>) -> ApiResult<FeedPage> {
    let page = state
        .feed
        .page(FeedQuery::new(q.page, q.per_page, q.user_id))
        .await?;
    Ok(Json(page))
}

pub async fn get_news(
    State(state): State<AppState>,
    Path(id): Path<SubmissionId>,
    Query(q): Query<NewsQuery>,
) -> ApiResult<FeedItem> {
    Ok(Json(state.feed.item(id, q.user_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRequest {
    pub post_id: SubmissionId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: String,
}

pub async fn react(State(state): State<AppState>, Json(req): Json<ReactionRequest>) -> ApiResult<ReactionOutcome> {
    let outcome = state
        .reactions
        .set_reaction_named(req.post_id, req.user_id, &req.kind)
        .await?;
    Ok(Json(outcome))
}

/// Only the transport bridge may relay events; the submitter fields it
/// carries decide whether moderation is skipped.
pub async fn intake(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<IntakeEvent>,
) -> ApiResult<IntakeReceipt> {
    let key = headers
        .get(INTAKE_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("missing {INTAKE_KEY_HEADER} header")))?;
    if !state.auth.verify_intake_key(key).await {
        return Err(AppError::Unauthorized("intake key rejected".into()).into());
    }
    Ok(Json(state.intake.accept(event).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationRequest {
    pub action: String,
    pub submission_id: Option<SubmissionId>,
    pub channel_id: Option<i64>,
    pub message_id: Option<i64>,
    pub message_text: Option<String>,
}

impl ModerationRequest {
    fn target(self) -> Result<ModerationTarget, AppError> {
        match (self.submission_id, self.channel_id, self.message_id) {
            (Some(id), _, _) => Ok(ModerationTarget::Submission(id)),
            (None, Some(channel_id), Some(message_id)) => Ok(ModerationTarget::Message {
                channel_id,
                message_id,
                text: self.message_text,
            }),
            _ => Err(AppError::ValidationError(
                "either submissionId or channelId with messageId is required".into(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationResponse {
    /// `false` when the target was not pending, e.g. already decided.
    pub applied: bool,
    pub submission: Option<Submission>,
}

async fn require_moderator(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let key = headers
        .get(MODERATOR_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("missing {MODERATOR_KEY_HEADER} header")))?;
    if !state.auth.verify_moderator_password(key).await {
        return Err(AppError::Unauthorized("moderator key rejected".into()));
    }
    Ok(())
}

pub async fn moderate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ModerationRequest>,
) -> ApiResult<ModerationResponse> {
    require_moderator(&state, &headers).await?;
    let action: ModerationAction = req.action.parse()?;
    let target = req.target()?;

    let decision = state.desk.moderate(action, &target).await?;
    info!(?action, ?target, applied = decision.is_some(), "moderation request handled");
    Ok(Json(ModerationResponse {
        applied: decision.is_some(),
        submission: decision.map(|d| d.submission),
    }))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: SubmissionId,
    pub partition: Partition,
}

pub async fn delete_news(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<SubmissionId>,
) -> Result<(StatusCode, Json<DeleteResponse>), ApiError> {
    require_moderator(&state, &headers).await?;
    let removal = state
        .desk
        .delete(&ModerationTarget::Submission(id))
        .await?
        .ok_or_else(|| AppError::NotFound("Submission".into(), id.to_string()))?;
    Ok((
        StatusCode::OK,
        Json(DeleteResponse {
            deleted: removal.submission.id,
            partition: removal.partition,
        }),
    ))
}
