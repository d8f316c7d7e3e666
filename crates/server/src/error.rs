use std::collections::BTreeMap;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::validation::FieldError;

const GENERIC_INTERNAL: &str = "Something went wrong";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },

    /// Validation failure reported as a `{field: message}` map.
    #[error("{message}")]
    ValidationMap {
        message: String,
        errors: BTreeMap<String, String>,
    },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    DuplicateKey(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Error body shared by every failing response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum FieldReport {
    List(Vec<FieldError>),
    Map(BTreeMap<String, String>),
}

/// Raw text of an internal failure, attached to the response so that a
/// non-production deployment can surface it.
#[derive(Clone, Debug)]
pub struct InternalErrorDetail(pub String);

impl AppError {
    pub fn validation(errors: Vec<FieldError>) -> Self {
        AppError::Validation {
            message: "Validation failed".to_string(),
            errors,
        }
    }

    pub fn not_found(resource: &str) -> Self {
        AppError::NotFound(format!("{resource} not found"))
    }

    pub fn invalid_credentials() -> Self {
        AppError::Unauthorized("Invalid credentials".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. }
            | AppError::ValidationMap { .. }
            | AppError::BadRequest(_)
            | AppError::DuplicateKey(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(e) if is_unique_violation(e) => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (body, detail) = match self {
            AppError::Validation { message, errors } => (
                ErrorBody {
                    success: false,
                    message,
                    errors: Some(FieldReport::List(errors)),
                    error: None,
                },
                None,
            ),
            AppError::ValidationMap { message, errors } => (
                ErrorBody {
                    success: false,
                    message,
                    errors: Some(FieldReport::Map(errors)),
                    error: None,
                },
                None,
            ),
            AppError::Database(e) if is_unique_violation(&e) => {
                tracing::debug!("Unique constraint rejected write: {e}");
                (
                    ErrorBody {
                        success: false,
                        message: "Duplicate field value".to_string(),
                        errors: None,
                        error: Some("A record with this value already exists".to_string()),
                    },
                    None,
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (internal_body(), Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (internal_body(), Some(msg))
            }
            other => (
                ErrorBody {
                    success: false,
                    message: other.to_string(),
                    errors: None,
                    error: None,
                },
                None,
            ),
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(detail) = detail {
            response.extensions_mut().insert(InternalErrorDetail(detail));
        }
        response
    }
}

fn internal_body() -> ErrorBody {
    ErrorBody {
        success: false,
        message: "Internal Server Error".to_string(),
        errors: None,
        error: Some(GENERIC_INTERNAL.to_string()),
    }
}
