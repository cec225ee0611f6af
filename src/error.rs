use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use thiserror::Error;

use crate::views;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("login required")]
    Unauthenticated,

    #[error("session layer is not installed")]
    MissingSession,

    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("password of {0} bytes exceeds the bcrypt limit")]
    PasswordTooLong(usize),

    #[error("bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("session encoding error: {0}")]
    SessionEncoding(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound(what) => {
                tracing::debug!("{what} not found");
                (StatusCode::NOT_FOUND, views::not_found()).into_response()
            }
            // The flash asking to log in is set by the extractor that rejected.
            AppError::Unauthenticated => Redirect::to("/login").into_response(),
            other => {
                tracing::error!("Request failed: {:?}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, views::server_error()).into_response()
            }
        }
    }
}
