use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;
use tracing::error;

use crate::models::DocumentStatus;

pub type AppResult<T> = Result<T, AppError>;

pub type DocumentResult<T> = Result<T, DocumentError>;

/// Rejections raised before any bytes are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("file field is required")]
    MissingFile,
    #[error("file field must not be empty")]
    EmptyFile,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("unsupported file type '{0}'. Allowed types: PDF, JPEG, PNG, DOC, DOCX")]
    UnsupportedMimeType(String),
    #[error("file is too large ({size} bytes). Maximum allowed size is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
    #[error("{0}")]
    InvalidInput(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob '{0}' not found")]
    NotFound(String),
    #[error("invalid storage path '{0}'")]
    InvalidPath(String),
    #[error("blob I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("document not found")]
    NotFound,
    #[error("document file not found")]
    FileMissing,
    #[error("cannot change status from {from} to {to}")]
    InvalidTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("persistence failure: {0}")]
    Persistence(#[source] anyhow::Error),
}

impl DocumentError {
    pub fn persistence(err: impl Into<anyhow::Error>) -> Self {
        DocumentError::Persistence(err.into())
    }
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "reviewer capability required")
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "resource not found")
    }

    pub fn internal<E: Display>(error: E) -> Self {
        error!(error = %error, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "failed to process document")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<DocumentError> for AppError {
    fn from(value: DocumentError) -> Self {
        match value {
            DocumentError::Validation(err) => AppError::bad_request(err.to_string()),
            DocumentError::NotFound => AppError::new(StatusCode::NOT_FOUND, "document not found"),
            DocumentError::FileMissing => {
                AppError::new(StatusCode::NOT_FOUND, "document file not found")
            }
            err @ DocumentError::InvalidTransition { .. } => {
                AppError::new(StatusCode::CONFLICT, err.to_string())
            }
            err @ (DocumentError::Storage(_) | DocumentError::Persistence(_)) => {
                AppError::internal(format!("{err:#}"))
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(format!("{value:#}"))
    }
}
