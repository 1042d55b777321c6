//! newsroom/crates/services/src/lib.rs
//!
//! The submission-and-moderation pipeline. Everything here talks to storage
//! through [`VersionedStore`] and to the outside world through the ports in
//! `domains`.

pub mod aggregator;
pub mod clock;
pub mod feed;
pub mod intake;
pub mod legacy;
pub mod metrics;
pub mod moderation;
pub mod publisher;
pub mod reactions;
pub mod retry;
pub mod store;
pub mod submissions;

pub use aggregator::{
    AggregationOutcome, AggregatorConfig, BatchEvent, BatchKey, MediaAggregator, SubmissionSink,
    SweepReport,
};
pub use clock::{ManualClock, SystemClock};
pub use feed::{Feed, FeedItem, FeedPage, FeedQuery};
pub use intake::{Intake, IntakeReceipt, IntakeStatus};
pub use legacy::normalize_legacy;
pub use metrics::PipelineMetrics;
pub use moderation::{ModerationDesk, ModerationTarget, ModerationWorkflow};
pub use publisher::Publisher;
pub use reactions::{ReactionLedger, ReactionOutcome};
pub use retry::RetryPolicy;
pub use store::VersionedStore;
pub use submissions::{extract_embedded_id, CreatedSubmission, SubmissionRepository};
