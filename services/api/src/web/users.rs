//! services/api/src/web/users.rs
//!
//! User management endpoints used by the admin console and the teacher's
//! class list.

use crate::web::{
    error::{HttpResult, JsonBody, QueryParams},
    state::AppState,
};
use attendance_core::{ErrorBody, MessageResponse, NewUser, Role, User, UserUpdate};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::IntoParams;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    /// Only return users with this role.
    pub role: Option<Role>,
}

/// GET /users - List users, optionally by role
#[utoipa::path(
    get,
    path = "/api/users",
    params(UserListQuery),
    responses(
        (status = 200, description = "Matching users", body = [User]),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<UserListQuery>,
) -> HttpResult<Json<Vec<User>>> {
    Ok(Json(state.db.list_users(query.role).await?))
}

/// POST /users - Create a user
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = NewUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Missing fields, duplicate id or email", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn create_user_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<NewUser>,
) -> HttpResult<(StatusCode, Json<User>)> {
    let user = state.db.create_user(req).await?;
    info!("Created {} {}", user.role, user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

/// PUT /users/{id} - Update a user; a blank password keeps the current one
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "The user's id")),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 400, description = "Invalid update or email already taken", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn update_user_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UserUpdate>,
) -> HttpResult<Json<User>> {
    Ok(Json(state.db.update_user(&id, req).await?))
}

/// DELETE /users/{id}
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = String, Path, description = "The user's id")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    tag = "users"
)]
pub async fn delete_user_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> HttpResult<Json<MessageResponse>> {
    state.db.delete_user(&id).await?;
    info!("Deleted user {}", id);
    Ok(Json(MessageResponse::new("User deleted successfully")))
}
