//! # Core Traits (Ports)
//!
//! Any adapter must implement these traits to be wired into the binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Document, ModerationAction, ModerationCorrelation, ModerationNotice, Submitter};

/// Opaque version token handed out by a backend read and required by the
/// matching write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Token of a document that has never been written.
    pub fn absent() -> Self {
        Self(String::new())
    }

    pub fn is_absent(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Result of a backend read. `document` is `None` only when the backend
/// positively knows the key has never been written.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub document: Option<Document>,
    pub version: VersionToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Stored; carries the new version token.
    Committed(VersionToken),
    /// `expected` no longer matched; nothing was written.
    Conflict,
}

/// Document-shaped storage offering optimistic concurrency only.
///
/// Implementations report reachability problems as `AppError::Unavailable`
/// and never retry on their own.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn read(&self) -> Result<Snapshot>;

    async fn write(&self, document: &Document, expected: &VersionToken) -> Result<WriteOutcome>;
}

/// Delivers moderation prompts to human moderators.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ModerationNotifier: Send + Sync {
    /// Sends the prompt and returns where it landed.
    async fn notify(&self, notice: &ModerationNotice) -> anyhow::Result<ModerationCorrelation>;

    /// Marks the prompt as decided (e.g. removes its controls).
    async fn finalize(
        &self,
        correlation: &ModerationCorrelation,
        action: ModerationAction,
    ) -> anyhow::Result<()>;

    /// Removes the prompt after the submission was deleted.
    async fn retract(&self, correlation: &ModerationCorrelation) -> anyhow::Result<()>;
}

/// Identity and moderation contract.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Privileged submitters skip moderation entirely.
    fn is_privileged(&self, submitter: &Submitter) -> bool;

    /// Verifies the shared moderator password used by the HTTP surface.
    async fn verify_moderator_password(&self, password: &str) -> bool;

    /// Verifies the key a transport bridge presents when relaying intake
    /// events. Submitter identities in an event are only trusted once the
    /// key checks out.
    async fn verify_intake_key(&self, key: &str) -> bool;
}

/// Source of the current time, injectable so that timer-driven behaviour can
/// be tested without sleeping.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
