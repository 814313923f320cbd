//! Session endpoints.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::AppState;
use crate::auth::Viewer;
use crate::errors::AppError;
use crate::models::{Identity, Session};

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub data: SignUpMetadata,
}

/// User metadata attached at registration.
#[derive(Debug, Default, Deserialize)]
pub struct SignUpMetadata {
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenParams {
    pub grant_type: String,
}

#[derive(Debug, Deserialize)]
pub struct UserUpdate {
    pub password: String,
}

/// POST /auth/v1/signup - Register and sign in.
pub async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignUpRequest>,
) -> Result<Json<Session>, AppError> {
    let session = state
        .repo
        .sign_up(
            &request.email,
            &request.password,
            request.data.full_name.as_deref(),
        )
        .await?;
    Ok(Json(session))
}

/// POST /auth/v1/token?grant_type=password - Sign in.
pub async fn token(
    State(state): State<AppState>,
    Query(params): Query<TokenParams>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<Session>, AppError> {
    if params.grant_type != "password" {
        return Err(AppError::BadRequest(format!(
            "Unsupported grant type: {}",
            params.grant_type
        )));
    }

    let session = state
        .repo
        .sign_in(&credentials.email, &credentials.password)
        .await?;
    Ok(Json(session))
}

/// GET /auth/v1/user - The signed-in user.
pub async fn get_user(viewer: Viewer) -> Result<Json<Identity>, AppError> {
    Ok(Json(viewer.require()?.clone()))
}

/// PUT /auth/v1/user - Change the password.
pub async fn update_user(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(update): Json<UserUpdate>,
) -> Result<Json<Identity>, AppError> {
    let identity = viewer.require()?;
    state.repo.update_password(identity, &update.password).await?;
    Ok(Json(identity.clone()))
}

/// POST /auth/v1/logout - Revoke the bearer session.
pub async fn logout(State(state): State<AppState>, viewer: Viewer) -> Result<StatusCode, AppError> {
    if let Some(token) = &viewer.token {
        state.repo.sign_out(token).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}
