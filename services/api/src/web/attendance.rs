//! services/api/src/web/attendance.rs

use crate::web::{
    error::{HttpResult, JsonBody, QueryParams},
    state::AppState,
};
use attendance_core::{AttendanceQuery, AttendanceRecord, ErrorBody};
use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

/// GET /attendance - Records matching the filters, newest first
///
/// `subject=All` disables the subject filter. Date bounds are inclusive.
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Matching records", body = [AttendanceRecord]),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "attendance"
)]
pub async fn list_attendance_handler(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<AttendanceQuery>,
) -> HttpResult<Json<Vec<AttendanceRecord>>> {
    Ok(Json(state.db.list_attendance(&query).await?))
}

/// POST /attendance - Mark one student for one subject and day
#[utoipa::path(
    post,
    path = "/api/attendance",
    request_body = AttendanceRecord,
    responses(
        (status = 201, description = "Attendance marked", body = AttendanceRecord),
        (status = 400, description = "Already marked or invalid record", body = ErrorBody)
    ),
    tag = "attendance"
)]
pub async fn mark_attendance_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<AttendanceRecord>,
) -> HttpResult<(StatusCode, Json<AttendanceRecord>)> {
    let (student_id, subject) = (req.student_id.clone(), req.subject.clone());
    match state.db.mark_attendance(req).await {
        Ok(record) => {
            info!(
                "Marked {} {} for {} on {}",
                record.student_id, record.status, record.subject, record.date
            );
            Ok((StatusCode::CREATED, Json(record)))
        }
        Err(e) => {
            warn!("Attendance for {} in {} rejected: {}", student_id, subject, e);
            Err(e.into())
        }
    }
}
