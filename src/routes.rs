use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::{auth::AppState, handlers, session::session_layer};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::home))
        .route("/tweet/{id}", get(handlers::show_tweet))
        .route(
            "/add-tweet",
            get(handlers::add_tweet_page).post(handlers::add_tweet),
        )
        .route(
            "/edit/{id}",
            get(handlers::edit_tweet_page).post(handlers::edit_tweet),
        )
        .route("/login", get(handlers::login_page).post(handlers::login))
        .route("/logout", get(handlers::logout).post(handlers::logout))
        .route(
            "/api/register",
            get(handlers::register_page).post(handlers::register),
        )
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(state.clone(), session_layer))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
