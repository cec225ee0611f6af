use axum_extra::extract::cookie::Key;
use clap::{Parser, ValueEnum};
use sha2::{Digest, Sha512};

#[derive(Parser, Debug, Clone)]
#[command(version, about = "A small server-rendered tweeting site", long_about = None)]
pub struct Args {
    /// Listening host
    #[arg(long, env = "CHIRP_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Listening port
    #[arg(short, long, env = "CHIRP_PORT", default_value_t = 5000)]
    pub port: u16,

    /// SQLite database location
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://twitter.db")]
    pub database_url: String,

    /// Secret used to sign the session cookie
    #[arg(long, env = "CHIRP_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Where server-side sessions live
    #[arg(long, env = "CHIRP_SESSION_STORE", value_enum, default_value_t = SessionBackend::Memory)]
    pub session_store: SessionBackend,

    /// Redis connection used when the session store is `redis`
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Idle lifetime of a session in seconds
    #[arg(long, env = "CHIRP_SESSION_TTL_SECS", default_value_t = 86400)]
    pub session_ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SessionBackend {
    Memory,
    Redis,
}

#[derive(Clone)]
pub struct Config {
    pub address: String,
    pub database_url: String,
    pub cookie_key: Key,
    pub session_backend: SessionBackend,
    pub redis_url: String,
    pub session_ttl_secs: u64,
}

impl Config {
    pub fn from_args(args: Args) -> Self {
        let cookie_key = match args.secret_key.as_deref() {
            Some(secret) if !secret.is_empty() => derive_cookie_key(secret),
            _ => {
                tracing::warn!(
                    "CHIRP_SECRET_KEY is not set, sessions will not survive a restart"
                );
                Key::generate()
            }
        };

        Config {
            address: format!("{}:{}", args.host, args.port),
            database_url: args.database_url,
            cookie_key,
            session_backend: args.session_store,
            redis_url: args.redis_url,
            session_ttl_secs: args.session_ttl_secs,
        }
    }
}

/// Cookie signing wants 64 bytes of key material; SHA-512 stretches any
/// configured secret to exactly that.
pub fn derive_cookie_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}
