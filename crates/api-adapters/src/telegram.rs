//! # TelegramNotifier
//!
//! Moderation prompts over the Telegram Bot API. A prompt is a message (or a
//! photo with caption) in the moderation chat carrying an approve/reject
//! inline keyboard whose callback data is `<action>:<submission id>`.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use domains::{
    AttachmentKind, ModerationAction, ModerationCorrelation, ModerationNotice, ModerationNotifier,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// Telegram caps photo captions at 1024 characters and texts at 4096.
const CAPTION_LIMIT: usize = 1024;
const TEXT_LIMIT: usize = 4096;

#[derive(Debug, Deserialize)]
struct BotResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
    chat: SentChat,
}

#[derive(Debug, Deserialize)]
struct SentChat {
    id: i64,
}

pub struct TelegramNotifier {
    client: Client,
    endpoint: SecretString,
    chat_id: i64,
}

impl TelegramNotifier {
    pub fn new(api_base: &str, token: &SecretString, chat_id: i64) -> Self {
        let endpoint = format!("{}/bot{}", api_base.trim_end_matches('/'), token.expose_secret());
        Self {
            client: Client::new(),
            endpoint: SecretString::from(endpoint),
            chat_id,
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, payload: Value) -> anyhow::Result<T> {
        let url = format!("{}/{method}", self.endpoint.expose_secret());
        let response: BotResponse<T> = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("{method} request failed: {}", e.without_url()))?
            .json()
            .await
            .with_context(|| format!("{method} returned an unreadable body"))?;

        if !response.ok {
            return Err(anyhow!(
                "{method} rejected: {}",
                response.description.unwrap_or_else(|| "no description".into())
            ));
        }
        response
            .result
            .ok_or_else(|| anyhow!("{method} returned no result"))
    }
}

/// `New submission #<id> from <name> (@handle):` followed by the body and
/// the origin, if any.
pub fn prompt_text(notice: &ModerationNotice) -> String {
    let mut text = format!("New submission #{} from {}", notice.submission_id, notice.submitter_name);
    if let Some(handle) = &notice.submitter_handle {
        text.push_str(&format!(" (@{handle})"));
    }
    text.push(':');
    if !notice.body.is_empty() {
        text.push_str("\n\n");
        text.push_str(&notice.body);
    }
    if let Some(origin) = &notice.origin_attribution {
        let label = origin.label();
        let line = match (label, origin.message_link.as_deref()) {
            (Some(label), Some(link)) => Some(format!("{label} {link}")),
            (Some(label), None) => Some(label),
            (None, Some(link)) => Some(link.to_string()),
            (None, None) => None,
        };
        if let Some(line) = line {
            text.push_str("\n\nSource: ");
            text.push_str(&line);
        }
    }
    text
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

pub fn decision_keyboard(submission_id: u64) -> Value {
    json!({
        "inline_keyboard": [[
            { "text": "Approve", "callback_data": format!("approve:{submission_id}") },
            { "text": "Reject", "callback_data": format!("reject:{submission_id}") }
        ]]
    })
}

#[async_trait]
impl ModerationNotifier for TelegramNotifier {
    async fn notify(&self, notice: &ModerationNotice) -> anyhow::Result<ModerationCorrelation> {
        let text = prompt_text(notice);
        let keyboard = decision_keyboard(notice.submission_id);
        let photo = notice
            .first_attachment
            .as_ref()
            .filter(|a| a.kind == AttachmentKind::Photo);

        let sent: SentMessage = match photo {
            Some(photo) => {
                self.call(
                    "sendPhoto",
                    json!({
                        "chat_id": self.chat_id,
                        "photo": photo.reference,
                        "caption": truncate(&text, CAPTION_LIMIT),
                        "reply_markup": keyboard,
                    }),
                )
                .await?
            }
            None => {
                self.call(
                    "sendMessage",
                    json!({
                        "chat_id": self.chat_id,
                        "text": truncate(&text, TEXT_LIMIT),
                        "reply_markup": keyboard,
                        "disable_web_page_preview": true,
                    }),
                )
                .await?
            }
        };
        debug!(id = notice.submission_id, message_id = sent.message_id, "moderation prompt sent");
        Ok(ModerationCorrelation {
            channel_id: sent.chat.id,
            message_id: sent.message_id,
        })
    }

    async fn finalize(&self, correlation: &ModerationCorrelation, action: ModerationAction) -> anyhow::Result<()> {
        let _: Value = self
            .call(
                "editMessageReplyMarkup",
                json!({
                    "chat_id": correlation.channel_id,
                    "message_id": correlation.message_id,
                    "reply_markup": { "inline_keyboard": [] },
                }),
            )
            .await?;
        debug!(message_id = correlation.message_id, ?action, "moderation prompt finalized");
        Ok(())
    }

    async fn retract(&self, correlation: &ModerationCorrelation) -> anyhow::Result<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({
                    "chat_id": correlation.channel_id,
                    "message_id": correlation.message_id,
                }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{Attachment, OriginAttribution};

    fn notice() -> ModerationNotice {
        ModerationNotice {
            submission_id: 42,
            body: "Road closed on Main St".into(),
            submitter_name: "Ana Ruiz".into(),
            submitter_handle: Some("ana".into()),
            first_attachment: Some(Attachment::photo("p1")),
            origin_attribution: None,
        }
    }

    #[test]
    fn prompt_carries_the_embedded_id() {
        let text = prompt_text(&notice());
        assert!(text.starts_with("New submission #42 from Ana Ruiz (@ana):"));
        assert_eq!(services::extract_embedded_id(&text), Some(42));
    }

    #[test]
    fn prompt_mentions_the_origin() {
        let mut notice = notice();
        notice.submitter_handle = None;
        notice.origin_attribution = Some(OriginAttribution {
            title: None,
            handle: Some("citynews".into()),
            message_link: Some("https://t.me/citynews/9".into()),
        });
        let text = prompt_text(&notice);
        assert!(text.starts_with("New submission #42 from Ana Ruiz:"));
        assert!(text.ends_with("Source: @citynews https://t.me/citynews/9"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate("ñandú", 3), "ñan");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn keyboard_encodes_action_and_id() {
        let keyboard = decision_keyboard(7);
        assert_eq!(keyboard["inline_keyboard"][0][0]["callback_data"], "approve:7");
        assert_eq!(keyboard["inline_keyboard"][0][1]["callback_data"], "reject:7");
    }
}
