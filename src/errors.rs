use axum::{http::StatusCode, Json};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Everything a command can report back to the user. None of these end the
/// session; the front-end prints them as `error: <message>`.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("unknown command: {0}. Try 'help'.")]
    UnknownCommand(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid N")]
    InvalidCount,
    #[error("access outside project root is blocked: {}", .0.display())]
    PathOutsideRoot(PathBuf),
    #[error("{0}")]
    NotFound(String),
    #[error("is a directory (use -r): {0}")]
    IsADirectory(String),
    #[error("{0}")]
    Refused(String),
    #[error("{0} unavailable on this platform")]
    Unsupported(&'static str),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    pub fn code(&self) -> &'static str {
        match self {
            ShellError::UnknownCommand(_) => "UnknownCommand",
            ShellError::Parse(_) => "Parse",
            ShellError::Usage(_) => "Usage",
            ShellError::InvalidCount => "Usage",
            ShellError::PathOutsideRoot(_) => "PathOutsideRoot",
            ShellError::NotFound(_) => "NotFound",
            ShellError::IsADirectory(_) => "IsADirectory",
            ShellError::Refused(_) => "Refused",
            ShellError::Unsupported(_) => "Unsupported",
            ShellError::Io(_) => "Io",
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ShellError::NotFound(what.into())
    }
}

pub type ShellResult<T> = Result<T, ShellError>;

/// Rejections raised by the web layer before a command ever runs.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("origin denied")]
    OriginDenied,
    #[error("request too large")]
    RequestTooLarge,
    #[error("rate limited")]
    RateLimited,
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "Unauthorized",
            AppError::OriginDenied => "OriginDenied",
            AppError::RequestTooLarge => "RequestTooLarge",
            AppError::RateLimited => "RateLimited",
            AppError::Internal(_) => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::OriginDenied => StatusCode::FORBIDDEN,
            AppError::RequestTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn into_response(err: AppError) -> (StatusCode, Json<ErrorBody>) {
    let code = err.code();
    let message = err.to_string();
    (err.status(), Json(ErrorBody { code, message }))
}
