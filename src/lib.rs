//! Compass: client-side sync layer for a team/couple coordination app.
//!
//! The gateway talks to the backend (hosted over HTTP, or the bundled SQLite
//! backend in-process), domain services wrap it with validation and procedure
//! fallbacks, and the sync views keep screen state consistent with realtime
//! change notifications.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod realtime;
pub mod services;
pub mod sync;

pub use api::{create_router, AppState};

#[cfg(test)]
mod tests;
