//! services/api/src/web/auth.rs
//!
//! Login and the simulated password reset.

use crate::web::{
    error::{HttpResult, JsonBody},
    state::AppState,
};
use attendance_core::{ErrorBody, LoginRequest, MessageResponse, PasswordResetRequest, User};
use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::{info, warn};

/// POST /login - Check credentials for the requested role
#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials accepted", body = User),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> HttpResult<Json<User>> {
    match state.db.login(&req).await {
        Ok(user) => {
            info!("{} logged in as {}", user.id, user.role);
            Ok(Json(user))
        }
        Err(e) => {
            warn!("Rejected login for {}", req.email);
            Err(e.into())
        }
    }
}

/// POST /forgot-password - Simulated reset for an existing account
#[utoipa::path(
    post,
    path = "/api/forgot-password",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset instructions sent", body = MessageResponse),
        (status = 404, description = "No account with this email", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn forgot_password_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<PasswordResetRequest>,
) -> HttpResult<Json<MessageResponse>> {
    let message = state.db.request_password_reset(&req.email).await?;
    Ok(Json(MessageResponse::new(message)))
}
