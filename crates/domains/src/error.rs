//! # AppError
//!
//! Centralized error handling for the newsroom pipeline.
//! Version conflicts are deliberately absent: they never leave the store.

use thiserror::Error;

/// The primary error type for all domain and service operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Backend unreachable or timed out. Retryable by the caller.
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    /// Every compare-and-swap attempt lost to a concurrent writer.
    #[error("gave up after {attempts} conflicting write attempts")]
    ConcurrencyExhausted { attempts: u32 },

    /// Resource not found (e.g., Submission not in the expected partition)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Malformed input, rejected before any store mutation
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Moderator credentials missing or wrong
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Infrastructure failure that is not a reachability problem
    /// (e.g., a stored document that no longer deserializes)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether a user-facing retry of the same action may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Unavailable(_) | AppError::ConcurrencyExhausted { .. }
        )
    }
}

/// A specialized Result type for newsroom logic.
pub type Result<T> = std::result::Result<T, AppError>;
