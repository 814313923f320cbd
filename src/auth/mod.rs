//! Request authentication for the local backend.
//!
//! Two layers: every request must carry the deployment's API key (constant-time
//! compared), and a bearer token, when present, resolves to the acting user.

use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::api::AppState;
use crate::errors::{codes, AppError, ErrorBody};
use crate::models::Identity;

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "apikey";

/// API key layer function that takes the expected key as a parameter.
pub async fn api_key_layer(expected_key: Option<String>, request: Request, next: Next) -> Response {
    // No key configured: open dev mode
    let Some(expected) = expected_key else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if constant_time_compare(key, &expected) => next.run(request).await,
        Some(_) => invalid_key_response("Invalid API key"),
        None => invalid_key_response("No API key found in request"),
    }
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn invalid_key_response(message: &str) -> Response {
    let error = AppError::Unauthenticated(message.to_string());
    let body = ErrorBody {
        code: codes::INVALID_API_KEY.to_string(),
        ..ErrorBody::new(&error)
    };
    (error.status_code(), axum::Json(body)).into_response()
}

/// The caller behind a request: anonymous when no bearer token was sent.
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    pub identity: Option<Identity>,
    pub token: Option<String>,
}

impl Viewer {
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The identity, or `Unauthenticated` for anonymous callers.
    pub fn require(&self) -> Result<&Identity, AppError> {
        self.identity
            .as_ref()
            .ok_or_else(|| AppError::Unauthenticated("Not signed in".to_string()))
    }
}

impl FromRequestParts<AppState> for Viewer {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(Viewer::default());
        };

        match state.repo.user_for_token(&token).await? {
            Some(identity) => Ok(Viewer {
                identity: Some(identity),
                token: Some(token),
            }),
            None => Err(AppError::Unauthenticated(
                "Invalid or expired session".to_string(),
            )),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
