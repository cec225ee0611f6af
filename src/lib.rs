pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod session;
pub mod views;

pub use auth::AppState;
pub use routes::create_router;
