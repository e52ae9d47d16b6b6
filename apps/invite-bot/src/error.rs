use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Failures of the quota store or invite registry.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable; callers retry later and must not assume quota is free.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("already exists")]
    AlreadyExists,
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        tracing::error!(?err, "redis error");
        Self::Unavailable(err.to_string())
    }
}

/// Failures talking to the Bot API.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("bot api error {code}: {description}")]
    Api { code: i64, description: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("timed out")]
    Timeout,
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Why an invite request failed. None of these leave quota or registry changed.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("store unavailable, try later")]
    TransientStore(#[source] StoreError),
    #[error("membership could not be checked")]
    MembershipUnavailable(#[source] ProviderError),
    #[error("invite link could not be created")]
    Provider(#[source] ProviderError),
    #[error("invite provider timed out")]
    ProviderTimeout,
    /// A freshly minted token already existed. Never retried.
    #[error("token collision on {0}")]
    TokenCollision(String),
}

impl IssueError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::TokenCollision(_))
    }
}

/// Structured error returned by the HTTP surface.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND".to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}
