//! Error model for skeleton key credentials and the HTTP boundary.
//! `CredentialError` is what the protocol layers return; `AppError` is the
//! frontend-facing shape with an HTTP status mapping, mirroring the unified error
//! model used by the server handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Failures raised by the credential protocol and its collaborators.
///
/// None of these are ever shown to the browser verbatim; verification collapses every
/// variant into a generic rejection and issuance into a boolean `false`.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Cookie present but not `<token>.<series>` with two non-empty parts.
    #[error("malformed credential")]
    MalformedCredential,
    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("series already in use")]
    DuplicateSeries,
    #[error("no unique series after {0} attempts")]
    SeriesExhausted(u32),
    #[error("identity directory unavailable: {0}")]
    Directory(String),
    #[error("hashing failed: {0}")]
    Hashing(String),
    #[error("random source failed: {0}")]
    Random(String),
    #[error("cookie rejected: {0}")]
    Cookie(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type CredentialResult<T> = Result<T, CredentialError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Auth { code: String, message: String },
    Csrf { code: String, message: String },
    Io { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Csrf { code, .. }
            | AppError::Io { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Csrf { message, .. }
            | AppError::Io { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn csrf<S: Into<String>>(code: S, msg: S) -> Self { AppError::Csrf { code: code.into(), message: msg.into() } }
    pub fn io<S: Into<String>>(code: S, msg: S) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Auth { .. } => 401,
            AppError::Csrf { .. } => 403,
            AppError::Io { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        match err {
            // Credential failures never say why; the browser only learns that login failed.
            CredentialError::MalformedCredential
            | CredentialError::DuplicateSeries
            | CredentialError::SeriesExhausted(_)
            | CredentialError::Cookie(_) => AppError::auth("login_failed", "login failed"),
            CredentialError::StoreUnavailable(m) | CredentialError::Directory(m) => AppError::io("unavailable".to_string(), m),
            CredentialError::Config(m) => AppError::user("bad_config".to_string(), m),
            CredentialError::Hashing(m) | CredentialError::Random(m) => AppError::internal("internal_error".to_string(), m),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({"status": "error", "code": self.code_str(), "error": self.message()});
        (status, Json(body)).into_response()
    }
}
