//! Pipeline counters, registered into the binary's Prometheus registry.

use domains::{ModerationAction, Partition};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PartitionLabels {
    pub partition: String,
}

impl From<Partition> for PartitionLabels {
    fn from(partition: Partition) -> Self {
        Self {
            partition: partition.to_string(),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DecisionLabels {
    pub action: String,
}

impl From<ModerationAction> for DecisionLabels {
    fn from(action: ModerationAction) -> Self {
        let action = match action {
            ModerationAction::Approve => "approve",
            ModerationAction::Reject => "reject",
        };
        Self {
            action: action.to_string(),
        }
    }
}

/// Cheap to clone; clones share the underlying counters.
#[derive(Clone, Default)]
pub struct PipelineMetrics {
    pub commits: Counter,
    pub conflicts: Counter,
    pub exhausted: Counter,
    pub submissions_created: Family<PartitionLabels, Counter>,
    pub decisions: Family<DecisionLabels, Counter>,
}

impl PipelineMetrics {
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "newsroom_document_commits",
            "Successful compare-and-swap writes",
            self.commits.clone(),
        );
        registry.register(
            "newsroom_document_conflicts",
            "Writes rejected because the version token was stale",
            self.conflicts.clone(),
        );
        registry.register(
            "newsroom_document_exhausted",
            "Updates abandoned after exhausting their attempts",
            self.exhausted.clone(),
        );
        registry.register(
            "newsroom_submissions_created",
            "Submissions created, by initial partition",
            self.submissions_created.clone(),
        );
        registry.register(
            "newsroom_moderation_decisions",
            "Approve/reject transitions applied",
            self.decisions.clone(),
        );
    }

    pub fn record_created(&self, partition: Partition) {
        self.submissions_created
            .get_or_create(&PartitionLabels::from(partition))
            .inc();
    }

    pub fn record_decision(&self, action: ModerationAction) {
        self.decisions
            .get_or_create(&DecisionLabels::from(action))
            .inc();
    }
}
