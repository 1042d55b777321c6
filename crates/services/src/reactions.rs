//! # ReactionLedger
//!
//! Per-user like/dislike toggles on published submissions. Each call is a
//! single document mutation so simultaneous reactions never lose a count.

use std::sync::Arc;

use domains::{
    AppError, ReactionAction, ReactionKind, Reactions, Result, SubmissionId, UserId,
};
use serde::Serialize;
use tracing::debug;

use crate::store::VersionedStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionOutcome {
    pub like_count: u64,
    pub dislike_count: u64,
    pub action: ReactionAction,
}

pub struct ReactionLedger {
    store: Arc<VersionedStore>,
}

impl ReactionLedger {
    pub fn new(store: Arc<VersionedStore>) -> Self {
        Self { store }
    }

    pub async fn set_reaction(
        &self,
        id: SubmissionId,
        user: UserId,
        kind: ReactionKind,
    ) -> Result<ReactionOutcome> {
        let outcome = self
            .store
            .update_document(|doc| {
                let submission = doc
                    .published
                    .iter_mut()
                    .find(|s| s.id == id)
                    .ok_or_else(|| AppError::NotFound("Submission".into(), id.to_string()))?;
                let ledger = submission.reactions.get_or_insert_with(Reactions::default);
                let action = toggle(ledger, user, kind);
                Ok(ReactionOutcome {
                    like_count: ledger.like_count,
                    dislike_count: ledger.dislike_count,
                    action,
                })
            })
            .await?;
        debug!(id, user, ?kind, action = ?outcome.action, "reaction applied");
        Ok(outcome)
    }

    /// Same as [`Self::set_reaction`] for a raw kind string; anything but
    /// `like`/`dislike` is rejected before touching the store.
    pub async fn set_reaction_named(&self, id: SubmissionId, user: UserId, kind: &str) -> Result<ReactionOutcome> {
        let kind = kind.parse::<ReactionKind>()?;
        self.set_reaction(id, user, kind).await
    }
}

/// Same kind again removes it; a different kind replaces the previous one.
fn toggle(ledger: &mut Reactions, user: UserId, kind: ReactionKind) -> ReactionAction {
    let previous = ledger.by_user.get(&user).copied();
    if previous == Some(kind) {
        ledger.by_user.remove(&user);
        let counter = ledger.counter_mut(kind);
        *counter = counter.saturating_sub(1);
        return ReactionAction::Removed;
    }
    if previous == Some(kind.opposite()) {
        let counter = ledger.counter_mut(kind.opposite());
        *counter = counter.saturating_sub(1);
    }
    ledger.by_user.insert(user, kind);
    *ledger.counter_mut(kind) += 1;
    ReactionAction::Added
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggling_twice_restores_the_ledger() {
        let mut ledger = Reactions::default();
        ledger.by_user.insert(9, ReactionKind::Dislike);
        ledger.dislike_count = 1;
        let before = ledger.clone();

        assert_eq!(toggle(&mut ledger, 1, ReactionKind::Like), ReactionAction::Added);
        assert_eq!(ledger.like_count, 1);
        assert_eq!(toggle(&mut ledger, 1, ReactionKind::Like), ReactionAction::Removed);
        assert_eq!(ledger, before);
    }

    #[test]
    fn switching_kind_moves_the_count() {
        let mut ledger = Reactions::default();
        toggle(&mut ledger, 1, ReactionKind::Like);
        assert_eq!(toggle(&mut ledger, 1, ReactionKind::Dislike), ReactionAction::Added);
        assert_eq!((ledger.like_count, ledger.dislike_count), (0, 1));
        assert_eq!(ledger.by_user.get(&1), Some(&ReactionKind::Dislike));
    }

    #[test]
    fn removal_floors_counters_at_zero() {
        let mut ledger = Reactions::default();
        ledger.by_user.insert(1, ReactionKind::Like);
        assert_eq!(toggle(&mut ledger, 1, ReactionKind::Like), ReactionAction::Removed);
        assert_eq!(ledger.like_count, 0);
    }
}
