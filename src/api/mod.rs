//! HTTP surface of the local backend.
//!
//! Mirrors the hosted backend's routes so the HTTP gateway transport can talk
//! to either: `/auth/v1` for sessions, `/rest/v1` for tables and procedures,
//! `/realtime/v1` for change streams.

mod accounts;
mod realtime;
mod rest;

pub use accounts::*;
pub use realtime::*;
pub use rest::*;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::config::Config;
use crate::db::Repository;
use crate::errors::AppError;
use crate::gateway::Table;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_key = state.config.api_key.clone();

    let api_routes = Router::new()
        // Sessions
        .route("/auth/v1/signup", post(sign_up))
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/user", get(get_user).put(update_user))
        .route("/auth/v1/logout", post(logout))
        // Procedures
        .route("/rest/v1/rpc/{name}", post(call_procedure))
        // Tables
        .route(
            "/rest/v1/{table}",
            get(select_rows)
                .post(insert_row)
                .patch(update_row)
                .delete(delete_row),
        )
        // Change streams
        .route("/realtime/v1/{table}", get(changes))
        .layer(middleware::from_fn(move |req, next| {
            auth::api_key_layer(api_key.clone(), req, next)
        }));

    // Health check (no key required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

fn parse_table(name: &str) -> Result<Table, AppError> {
    Table::from_name(name).ok_or_else(|| {
        AppError::NotFound(format!("relation \"public.{}\" does not exist", name))
    })
}
