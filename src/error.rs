use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::dotenv::Error as DotError;
use crate::jsonwebtoken::errors::Error as JsonWebTokenError;
use crate::thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("dotenv error")]
    DotEnvError(#[from] DotError),

    #[error("jwt error")]
    JWTError(#[from] JsonWebTokenError),

    #[error("poll not found")]
    PollNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("poll is closed")]
    PollClosed,

    #[error("already voted on this poll")]
    AlreadyVoted,

    #[error("option does not belong to this poll")]
    InvalidOption,

    #[error("bussiness error: {0}")]
    BusinessError(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden")]
    Forbidden,
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::PollNotFound | Error::UserNotFound => StatusCode::NOT_FOUND,
            Error::PollClosed | Error::AlreadyVoted => StatusCode::CONFLICT,
            Error::InvalidOption | Error::BusinessError(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) | Error::JWTError(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::DatabaseError(_) | Error::DotEnvError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

// Unique violations on the votes table are how the storage layer says
// "already voted" (see migrations/0001_init.sql).
pub fn vote_insert_error(e: sqlx::Error) -> Error {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23505") {
            return Error::AlreadyVoted;
        }
    }
    Error::DatabaseError(e)
}

pub fn unique_violation(e: sqlx::Error, msg: &str) -> Error {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23505") {
            return Error::BusinessError(msg.into());
        }
    }
    Error::DatabaseError(e)
}
