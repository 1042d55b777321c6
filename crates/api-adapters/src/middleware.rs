//! newsroom/crates/api-adapters/src/middleware.rs
//!
//! Tower layers shared by every route.

use std::time::Duration;

use axum::http::{header, HeaderName, Method};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const MODERATOR_KEY_HEADER: &str = "x-moderator-key";
pub const INTAKE_KEY_HEADER: &str = "x-intake-key";

/// Request/response spans at the `tower_http` target.
pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}

/// Open to any origin.
pub fn cors_policy() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(MODERATOR_KEY_HEADER),
            HeaderName::from_static(INTAKE_KEY_HEADER),
        ])
        .max_age(Duration::from_secs(3600))
}
