use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by the API client and the login flow.
///
/// `Clone` is required so a single refresh outcome can be handed to every
/// caller that joined the in-flight operation; the `reqwest` error is held
/// behind an `Arc` for that reason.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Authentication expired - login required")]
    AuthExpired,

    #[error("Token refresh rejected (status {status})")]
    RefreshFailed { status: u16 },

    #[error("Network error: {0}")]
    Network(Arc<reqwest::Error>),

    #[error("Login initiation failed: {0}")]
    LoginInitFailed(String),

    #[error("Token fetch failed: {0}")]
    TokenFetchFailed(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(Arc::new(err))
    }
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}
