use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::middleware::{cors_policy, trace_layer};
use crate::state::AppState;

/// Every route of the public API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/api/news", get(handlers::list_news))
        .route(
            "/api/news/{id}",
            get(handlers::get_news).delete(handlers::delete_news),
        )
        .route("/api/reactions", post(handlers::react))
        .route("/api/intake", post(handlers::intake))
        .route("/api/moderation", post(handlers::moderate))
        .layer(cors_policy())
        .layer(trace_layer())
        .with_state(state)
}
