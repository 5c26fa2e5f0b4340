use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the scan engine.
///
/// Only [`ScanError::Validation`] and [`ScanError::NotFound`] reach callers of
/// the coordinator directly. The remaining kinds are produced by repository
/// sources and parsers; the worker decides whether they fail a repository or
/// become per-file warnings.
#[derive(Debug, Clone, Error)]
pub enum ScanError {
    /// The request itself is malformed. Never retried.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Unknown run, repository, ref or object.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing, expired or insufficient credential.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The provider refused the request because the quota is exhausted.
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    /// A single fetch failed (network, timeout, unexpected status).
    #[error("Fetch failed for {path}: {message}")]
    TransientFetch { path: String, message: String },

    /// A manifest could not be parsed.
    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}

impl ScanError {
    pub fn transient(path: impl Into<String>, message: impl ToString) -> Self {
        ScanError::TransientFetch {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Short machine-friendly name of the error kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::Validation(_) => "validation",
            ScanError::NotFound(_) => "not_found",
            ScanError::Auth(_) => "auth",
            ScanError::RateLimit { .. } => "rate_limit",
            ScanError::TransientFetch { .. } => "transient_fetch",
            ScanError::Parse { .. } => "parse",
        }
    }

    /// Returns a user-facing message with remediation hints.
    pub fn help_message(&self) -> String {
        match self {
            ScanError::Auth(detail) => format!(
                "Authentication failed ({}). Check that the access token is set and has not expired.",
                detail
            ),
            ScanError::RateLimit {
                retry_after: Some(wait),
                ..
            } => format!(
                "Provider rate limit exhausted. Retry in {} seconds or configure an access token.",
                wait.as_secs().max(1)
            ),
            ScanError::RateLimit { .. } => {
                "Provider rate limit exhausted. Retry later or configure an access token.".to_string()
            }
            ScanError::NotFound(what) => format!("Not found: {}", what),
            other => other.to_string(),
        }
    }
}
