//! Error types for the Infrared domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Every error is local to
//! one top-level request: the orchestrator surfaces it and the session goes on.

use crate::ops::Verdict;
use crate::phase::Phase;
use thiserror::Error;

/// The top-level error type for all Infrared operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model transport ---
    #[error("Transport error: {0}")]
    Transport(#[from] ProviderError),

    // --- Model output ---
    #[error("Malformed {phase} response: {detail}")]
    MalformedResponse { phase: Phase, detail: String },

    // --- File operations ---
    #[error("File not found: {path}")]
    NotFound { path: String },

    #[error("Original snippet not found in '{path}'")]
    SnippetNotFound { path: String },

    #[error("Ambiguous edit in '{path}': {count} matches")]
    AmbiguousEdit { path: String, count: usize },

    #[error("Path security violation for '{path}': {reason}")]
    PathSecurityViolation { path: String, reason: String },

    #[error("I/O error on '{path}': {reason}")]
    Io { path: String, reason: String },

    // --- Review loop ---
    #[error("Unresolved after {attempts} attempts")]
    RetryCeilingExceeded { attempts: u32 },

    #[error("Changes rejected by review ({verdict}): {explanation}")]
    ReviewRejected { verdict: Verdict, explanation: String },

    #[error("Request cancelled")]
    Cancelled,

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures at the model-call boundary. Never retried inside the core.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid transport response: {0}")]
    InvalidResponse(String),
}
