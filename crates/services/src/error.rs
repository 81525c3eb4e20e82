//! Shared error types for the services crate.

use thiserror::Error;

use kwave_core::SessionError;
use kwave_core::model::ExamSetId;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors from the REST boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// The backend answered but refused the request (`success: false` or a non-2xx status).
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("response envelope carried no data")]
    MissingData,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. } => Some(*status),
            ApiError::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Errors emitted while loading exam content.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContentError {
    #[error("exam set {0} not found")]
    NotFound(ExamSetId),
    #[error("invalid exam content: {0}")]
    Invalid(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors a `ResultSink` reports for one delivery attempt.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SinkError {
    #[error("result delivery unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors emitted by `ResultDeliveryService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeliveryError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ExamSessionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExamServiceError {
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AuthState`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("access token must not be empty")]
    EmptyToken,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors raised while reading `ServiceConfig` from the environment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{key} is not a valid URL: {raw}")]
    InvalidUrl { key: &'static str, raw: String },
    #[error("{key} must be a positive integer, got {raw}")]
    InvalidNumber { key: &'static str, raw: String },
    #[error("{key} must be true or false, got {raw}")]
    InvalidBool { key: &'static str, raw: String },
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Api(#[from] ApiError),
}
