//! services/api/src/web/rest.rs
//!
//! Contains the settings and health handlers and the master definition for
//! the OpenAPI specification.

use crate::web::{
    attendance, auth,
    error::{HttpResult, JsonBody},
    notices,
    state::AppState,
    users,
};
use attendance_core::{
    Attachment, AttendanceRecord, AttendanceStatus, Cie, ErrorBody, HealthStatus, LoginRequest,
    MessageResponse, NewUser, Notice, NoticeUpdate, PasswordResetRequest, Role, SettingsUpdate,
    StoreConnectionState, SystemSettings, User, UserUpdate,
};
use axum::{extract::State, Json};
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use tracing::info;
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_handler,
        auth::forgot_password_handler,
        users::list_users_handler,
        users::create_user_handler,
        users::update_user_handler,
        users::delete_user_handler,
        attendance::list_attendance_handler,
        attendance::mark_attendance_handler,
        notices::list_notices_handler,
        notices::create_notice_handler,
        notices::update_notice_handler,
        notices::delete_notice_handler,
        get_settings_handler,
        save_settings_handler,
        health_handler,
    ),
    components(
        schemas(
            Role, Cie, User, NewUser, UserUpdate, LoginRequest, PasswordResetRequest,
            AttendanceStatus, AttendanceRecord, Attachment, Notice, NoticeUpdate,
            SystemSettings, SettingsUpdate, StoreConnectionState, HealthStatus,
            MessageResponse, ErrorBody
        )
    ),
    tags(
        (name = "auth", description = "Login and password reset."),
        (name = "users", description = "Admin, teacher and student accounts."),
        (name = "attendance", description = "Attendance marks, one per student, subject and day."),
        (name = "notices", description = "Teacher notices with PDF attachments."),
        (name = "system", description = "School settings and service health.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Settings and Health Handlers
//=========================================================================================

/// GET /settings - The school settings, created with defaults on first read
#[utoipa::path(
    get,
    path = "/api/settings",
    responses(
        (status = 200, description = "Current settings", body = SystemSettings),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "system"
)]
pub async fn get_settings_handler(
    State(state): State<Arc<AppState>>,
) -> HttpResult<Json<SystemSettings>> {
    Ok(Json(state.db.get_settings().await?))
}

/// POST /settings - Upsert the school settings; absent fields are kept
#[utoipa::path(
    post,
    path = "/api/settings",
    request_body = SettingsUpdate,
    responses(
        (status = 200, description = "Saved settings", body = SystemSettings),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "system"
)]
pub async fn save_settings_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<SettingsUpdate>,
) -> HttpResult<Json<SystemSettings>> {
    let settings = state.db.save_settings(req).await?;
    info!("Settings saved for {}", settings.school_name);
    Ok(Json(settings))
}

/// GET /health - Liveness plus the state of the store connection
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is up", body = HealthStatus)
    ),
    tag = "system"
)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        store_connection_state: state.db.connection_state().await,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}
