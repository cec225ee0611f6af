use std::sync::Arc;

use chirp::{
    auth::AppState,
    config::{Args, Config, SessionBackend},
    db, routes,
    session::{MemorySessionStore, RedisSessionStore, SessionStore},
};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let config = Config::from_args(Args::parse());

    let pool = db::connect(&config.database_url)
        .await
        .expect("Failed to open database");

    let sessions: Arc<dyn SessionStore> = match config.session_backend {
        SessionBackend::Memory => Arc::new(MemorySessionStore::new(config.session_ttl_secs)),
        SessionBackend::Redis => {
            let client = redis::Client::open(config.redis_url.as_str())
                .expect("Failed to create Redis client");
            Arc::new(RedisSessionStore::new(
                Arc::new(client),
                config.session_ttl_secs,
            ))
        }
    };

    let app_state = AppState {
        pool,
        sessions,
        cookie_key: config.cookie_key.clone(),
    };

    let app = routes::create_router(app_state);
    let listener = tokio::net::TcpListener::bind(&config.address)
        .await
        .expect("Failed to bind address");

    tracing::info!("Server running on http://{}", config.address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down...");
}
