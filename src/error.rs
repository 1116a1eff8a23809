//! Error types shared across the war pipeline and ranking cache.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;

/// Result type for warboard operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or self-referential submission.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Duplicate war, duplicate side or role conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// War or player absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// A submitted nickname could not be matched or created.
    #[error("unresolved identity: {0}")]
    UnresolvedIdentity(String),

    /// Any failure inside the ranking-cache path.
    #[error("cache error: {0}")]
    Cache(String),

    /// Relational-store failure.
    #[error("store error: {0}")]
    Store(String),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        // A unique-constraint hit on commit is the backstop for the
        // read-then-write duplicate-side race: surface it as a conflict.
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return Error::Conflict(db.message().to_string());
            }
        }
        Error::Store(e.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Cache(e.to_string())
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::UnresolvedIdentity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Cache(_) | Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
