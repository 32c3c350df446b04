//! services/api/src/web/notices.rs
//!
//! Teacher notices. Students only ever see notices from teachers they are
//! enrolled under.

use crate::web::{
    error::{HttpResult, JsonBody, QueryParams},
    state::AppState,
};
use attendance_core::{ErrorBody, MessageResponse, Notice, NoticeQuery, NoticeUpdate};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::info;

/// GET /notices - Notices for a teacher or visible to a student, newest first
#[utoipa::path(
    get,
    path = "/api/notices",
    params(NoticeQuery),
    responses(
        (status = 200, description = "Matching notices", body = [Notice])
    ),
    tag = "notices"
)]
pub async fn list_notices_handler(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<NoticeQuery>,
) -> HttpResult<Json<Vec<Notice>>> {
    Ok(Json(state.db.list_notices(&query).await?))
}

/// POST /notices
#[utoipa::path(
    post,
    path = "/api/notices",
    request_body = Notice,
    responses(
        (status = 201, description = "Notice posted", body = Notice),
        (status = 400, description = "Missing title or duplicate id", body = ErrorBody)
    ),
    tag = "notices"
)]
pub async fn create_notice_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<Notice>,
) -> HttpResult<(StatusCode, Json<Notice>)> {
    let notice = state.db.create_notice(req).await?;
    info!(
        "{} posted notice {} with {} attachment(s)",
        notice.teacher_id,
        notice.id,
        notice.attachments.len()
    );
    Ok((StatusCode::CREATED, Json(notice)))
}

/// PUT /notices/{id}
#[utoipa::path(
    put,
    path = "/api/notices/{id}",
    params(("id" = String, Path, description = "The notice's id")),
    request_body = NoticeUpdate,
    responses(
        (status = 200, description = "Notice updated", body = Notice),
        (status = 404, description = "Notice not found", body = ErrorBody)
    ),
    tag = "notices"
)]
pub async fn update_notice_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<NoticeUpdate>,
) -> HttpResult<Json<Notice>> {
    Ok(Json(state.db.update_notice(&id, req).await?))
}

/// DELETE /notices/{id}
#[utoipa::path(
    delete,
    path = "/api/notices/{id}",
    params(("id" = String, Path, description = "The notice's id")),
    responses(
        (status = 200, description = "Notice deleted", body = MessageResponse),
        (status = 404, description = "Notice not found", body = ErrorBody)
    ),
    tag = "notices"
)]
pub async fn delete_notice_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> HttpResult<Json<MessageResponse>> {
    state.db.delete_notice(&id).await?;
    Ok(Json(MessageResponse::new("Notice deleted")))
}
