//! Server-side sessions.
//!
//! The browser only holds a signed cookie with an opaque token; the logged-in
//! user and pending flash messages live in a `SessionStore`. `session_layer`
//! loads the session before the handler runs and writes it back afterwards,
//! so handlers only ever see the request-scoped `Session` handle.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    SignedCookieJar,
};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{auth::AppState, error::AppError};

pub const SESSION_COOKIE: &str = "chirp_session";

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionData {
    pub user_id: Option<i64>,
    #[serde(default)]
    pub flashes: Vec<String>,
}

impl SessionData {
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.flashes.is_empty()
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, token: &str) -> Result<Option<SessionData>, AppError>;

    async fn save(&self, token: &str, data: &SessionData) -> Result<(), AppError>;

    async fn destroy(&self, token: &str) -> Result<(), AppError>;
}

pub fn generate_token() -> String {
    Uuid::new_v4().to_string()
}

/// Upper bound on how often `MemorySessionStore` sweeps expired entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Default)]
struct MemorySessions {
    entries: HashMap<String, (SessionData, Instant)>,
    next_sweep: Option<Instant>,
}

pub struct MemorySessionStore {
    ttl: Duration,
    sweep_interval: Duration,
    sessions: RwLock<MemorySessions>,
}

impl MemorySessionStore {
    pub fn new(ttl_secs: u64) -> Self {
        let ttl = Duration::from_secs(ttl_secs);
        Self {
            ttl,
            sweep_interval: ttl.min(SWEEP_INTERVAL),
            sessions: RwLock::new(MemorySessions::default()),
        }
    }

    #[cfg(test)]
    async fn stored(&self) -> usize {
        self.sessions.read().await.entries.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, token: &str) -> Result<Option<SessionData>, AppError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .entries
            .get(token)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(data, _)| data.clone()))
    }

    async fn save(&self, token: &str, data: &SessionData) -> Result<(), AppError> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();

        // Expired entries are invisible to `load`; they only need to be
        // dropped often enough to bound memory.
        if sessions.next_sweep.map_or(true, |at| at <= now) {
            sessions
                .entries
                .retain(|_, (_, expires_at)| *expires_at > now);
            sessions.next_sweep = Some(now + self.sweep_interval);
        }

        sessions
            .entries
            .insert(token.to_string(), (data.clone(), now + self.ttl));
        Ok(())
    }

    async fn destroy(&self, token: &str) -> Result<(), AppError> {
        let mut sessions = self.sessions.write().await;
        sessions.entries.remove(token);
        Ok(())
    }
}

pub struct RedisSessionStore {
    client: Arc<redis::Client>,
    ttl_secs: u64,
}

impl RedisSessionStore {
    pub fn new(client: Arc<redis::Client>, ttl_secs: u64) -> Self {
        Self { client, ttl_secs }
    }

    fn key(token: &str) -> String {
        format!("session:{}", token)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, token: &str) -> Result<Option<SessionData>, AppError> {
        if Uuid::parse_str(token).is_err() {
            return Ok(None);
        }

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(Self::key(token)).await?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, token: &str, data: &SessionData) -> Result<(), AppError> {
        let raw = serde_json::to_string(data)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(Self::key(token), raw, self.ttl_secs).await?;
        Ok(())
    }

    async fn destroy(&self, token: &str) -> Result<(), AppError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(Self::key(token)).await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SessionState {
    data: SessionData,
    dirty: bool,
    renew: bool,
}

/// Request-scoped view of the caller's session.
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    fn new(data: SessionData) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                data,
                ..Default::default()
            })),
        }
    }

    pub async fn user_id(&self) -> Option<i64> {
        self.state.lock().await.data.user_id
    }

    /// Binds the session to `user_id` under a fresh token.
    pub async fn log_in(&self, user_id: i64) {
        let mut state = self.state.lock().await;
        state.data.user_id = Some(user_id);
        state.dirty = true;
        state.renew = true;
    }

    /// Forgets the user. Pending flashes survive and move to a fresh token.
    pub async fn log_out(&self) {
        let mut state = self.state.lock().await;
        state.data.user_id = None;
        state.dirty = true;
        state.renew = true;
    }

    pub async fn flash(&self, message: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.data.flashes.push(message.into());
        state.dirty = true;
    }

    pub async fn take_flashes(&self) -> Vec<String> {
        let mut state = self.state.lock().await;
        if state.data.flashes.is_empty() {
            return Vec::new();
        }
        state.dirty = true;
        std::mem::take(&mut state.data.flashes)
    }

    /// Writes the session back to the store and returns the cookie jar the
    /// response should carry. `token` is the cookie token, if it named a live
    /// session.
    async fn persist(
        &self,
        store: &dyn SessionStore,
        token: Option<String>,
        had_cookie: bool,
        jar: SignedCookieJar,
    ) -> Result<SignedCookieJar, AppError> {
        let state = self.state.lock().await;

        if !state.dirty && !state.renew {
            if had_cookie && token.is_none() {
                return Ok(jar.remove(removal_cookie()));
            }
            return Ok(jar);
        }

        let mut token = token;
        if state.renew {
            if let Some(old) = token.take() {
                store.destroy(&old).await?;
            }
        }

        if state.data.is_empty() {
            if let Some(old) = token {
                store.destroy(&old).await?;
            }
            return Ok(if had_cookie {
                jar.remove(removal_cookie())
            } else {
                jar
            });
        }

        let token = token.unwrap_or_else(generate_token);
        store.save(&token, &state.data).await?;

        let cookie = Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);
        Ok(jar.add(cookie))
    }
}

fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(AppError::MissingSession)
    }
}

pub async fn session_layer(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let cookie_token = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let had_cookie = cookie_token.is_some();

    let loaded = match cookie_token.as_deref() {
        Some(token) => state.sessions.load(token).await?,
        None => None,
    };
    let live_token = cookie_token.filter(|_| loaded.is_some());

    let session = Session::new(loaded.unwrap_or_default());
    req.extensions_mut().insert(session.clone());

    let response = next.run(req).await;

    let jar = session
        .persist(state.sessions.as_ref(), live_token, had_cookie, jar)
        .await?;
    Ok((jar, response).into_response())
}
