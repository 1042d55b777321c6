//! # api-adapters
//!
//! Outer surfaces of newsroom: the HTTP API (`web-axum`) and the Telegram
//! moderation transport (`telegram`).

#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod handlers;
#[cfg(feature = "web-axum")]
pub mod middleware;
#[cfg(feature = "web-axum")]
pub mod router;
#[cfg(feature = "web-axum")]
pub mod state;
#[cfg(feature = "telegram")]
pub mod telegram;

#[cfg(feature = "web-axum")]
pub use router::router;
#[cfg(feature = "web-axum")]
pub use state::AppState;
#[cfg(feature = "telegram")]
pub use telegram::TelegramNotifier;
