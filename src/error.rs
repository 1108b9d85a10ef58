//! Crate-wide error type.
//!
//! Every handler returns `Result<HttpResponse, AppError>`. Client mistakes
//! carry their own message; anything that went wrong on our side (store,
//! upstream services, templates) is logged and answered with the generic
//! "Something went wrong" body the app shows as a toast.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::error;
use serde::Serialize;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("invalid input: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{title}: {description}")]
    Rejected { title: String, description: String },

    #[error("identity provider returned {status}: {message}")]
    Identity { status: u16, message: String },

    #[error("upstream service returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("not configured: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    #[error("serialization error: {0}")]
    Bson(#[from] mongodb::bson::ser::Error),
}

impl AppError {
    /// Shorthand for a 400 carrying a toast title and description.
    pub fn rejected(title: impl Into<String>, description: impl Into<String>) -> Self {
        AppError::Rejected {
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Toast-shaped error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub title: String,
    pub description: String,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) | AppError::Rejected { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Identity { status, .. } if (400..500).contains(status) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (title, description) = match self {
            AppError::BadRequest(msg) => ("Invalid request".to_string(), msg.clone()),
            AppError::Validation(errs) => ("Invalid request".to_string(), errs.to_string()),
            AppError::Unauthorized => (
                "Unauthorized".to_string(),
                "Please sign in to continue".to_string(),
            ),
            AppError::Forbidden(msg) => ("Forbidden".to_string(), msg.clone()),
            AppError::NotFound(msg) => ("Not found".to_string(), msg.clone()),
            AppError::Rejected { title, description } => (title.clone(), description.clone()),
            AppError::Identity { status, message } if (400..500).contains(status) => {
                ("Authentication failed".to_string(), message.clone())
            }
            other => {
                error!("{}", other);
                ("Error".to_string(), "Something went wrong".to_string())
            }
        };
        HttpResponse::build(self.status_code()).json(ErrorBody { title, description })
    }
}

/// True when the store rejected a write because of a unique index.
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == 11000,
        _ => false,
    }
}
