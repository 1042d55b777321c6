use std::sync::Arc;

use domains::AuthProvider;
use prometheus_client::registry::Registry;
use services::{Feed, Intake, ModerationDesk, ReactionLedger};

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub feed: Arc<Feed>,
    pub reactions: Arc<ReactionLedger>,
    pub intake: Arc<Intake>,
    pub desk: Arc<ModerationDesk>,
    pub auth: Arc<dyn AuthProvider>,
    pub registry: Arc<Registry>,
}
