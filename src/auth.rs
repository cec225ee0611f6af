use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::Key;
use sqlx::SqlitePool;

use crate::{
    db,
    error::AppError,
    forms::PASSWORD_MAX_BYTES,
    session::{Session, SessionStore},
};

pub const LOGIN_PROMPT: &str = "Please log in to access this page.";

/// bcrypt with a random per-hash salt. Runs on the blocking pool because a
/// single hash takes tens of milliseconds. Passwords past bcrypt's 72-byte
/// window are refused instead of silently truncated.
pub async fn hash_password(password: &str) -> Result<String, AppError> {
    if password.len() > PASSWORD_MAX_BYTES {
        return Err(AppError::PasswordTooLong(password.len()));
    }
    let password = password.to_string();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await??;
    Ok(hash)
}

/// A password longer than bcrypt's window never matches: every stored hash
/// was made from at most `PASSWORD_MAX_BYTES` bytes.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    if password.len() > PASSWORD_MAX_BYTES {
        return Ok(false);
    }
    let password = password.to_string();
    let hash = hash.to_string();
    let is_valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??;
    Ok(is_valid)
}

/// The logged-in user, resolved from the session against the database.
/// Rejects with a redirect to the login page.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: i64,
    pub username: String,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        let app_state = AppState::from_ref(state);

        let Some(user_id) = session.user_id().await else {
            session.flash(LOGIN_PROMPT).await;
            return Err(AppError::Unauthenticated);
        };

        match db::find_user(&app_state.pool, user_id).await? {
            Some(user) => Ok(CurrentUser {
                user_id: user.id,
                username: user.username,
            }),
            None => {
                tracing::warn!("Session refers to missing user {}", user_id);
                session.log_out().await;
                session.flash(LOGIN_PROMPT).await;
                Err(AppError::Unauthenticated)
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub sessions: Arc<dyn SessionStore>,
    pub cookie_key: Key,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
