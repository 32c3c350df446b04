//! services/api/src/web/error.rs
//!
//! Turns store errors into HTTP responses with an `ErrorBody` payload.

use attendance_core::{ErrorBody, PortError};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::{error, warn};

/// The error half of every handler's result.
#[derive(Debug)]
pub struct HttpError(pub PortError);

impl HttpError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PortError::Validation(_) | PortError::Duplicate(_) => StatusCode::BAD_REQUEST,
            PortError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            PortError::NotFound(_) => StatusCode::NOT_FOUND,
            PortError::Connectivity(_) | PortError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<PortError> for HttpError {
    fn from(e: PortError) -> Self {
        Self(e)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {:?}", self.0);
        }
        let body = ErrorBody {
            message: self.0.message().to_string(),
            code: Some(self.0.code().to_string()),
        };
        (status, Json(body)).into_response()
    }
}

pub type HttpResult<T> = Result<T, HttpError>;

/// A JSON request body whose decoding failures answer 400 with an `ErrorBody`.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(HttpError))]
pub struct JsonBody<T>(pub T);

/// Query parameters whose decoding failures answer 400 with an `ErrorBody`.
#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(HttpError))]
pub struct QueryParams<T>(pub T);

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        warn!("Rejected request body: {}", rejection.body_text());
        Self(PortError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for HttpError {
    fn from(rejection: QueryRejection) -> Self {
        warn!("Rejected query string: {}", rejection.body_text());
        Self(PortError::Validation(rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_errors_map_to_client_statuses() {
        let cases = [
            (PortError::Validation("v".into()), StatusCode::BAD_REQUEST),
            (PortError::Duplicate("d".into()), StatusCode::BAD_REQUEST),
            (PortError::Unauthorized("u".into()), StatusCode::UNAUTHORIZED),
            (PortError::NotFound("n".into()), StatusCode::NOT_FOUND),
            (PortError::Unexpected("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(HttpError(err).status(), status);
        }
    }
}
