//! crates/attendance_client/src/remote.rs
//!
//! The HTTP implementation of `AttendanceStore`. It owns transport details
//! only: URL building, JSON bodies and the mapping of transport failures and
//! error responses onto `PortError`. Anything that prevents a response from
//! arriving becomes `PortError::Connectivity`; a response that arrives with an
//! error status becomes the application error the server described.

use async_trait::async_trait;
use attendance_core::{
    AttendanceQuery, AttendanceRecord, AttendanceStore, ErrorBody, LoginRequest, MessageResponse,
    NewUser, Notice, NoticeQuery, NoticeUpdate, PasswordResetRequest, PortError, PortResult, Role,
    SettingsUpdate, StoreConnectionState, SystemSettings, User, UserUpdate,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::error::ClientError;

/// Upper bound for the reachability check.
pub const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct RemoteStore {
    client: Client,
    base_url: Url,
}

impl RemoteStore {
    /// Builds a store against `base_url` (for example `http://localhost:5000/api`)
    /// with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidUrl(base_url.to_string(), e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(
                base_url.to_string(),
                "URL cannot carry a path".to_string(),
            ));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> PortResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PortError::Unexpected(format!("Invalid API URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Lightweight reachability check bounded by `REACHABILITY_TIMEOUT`. Only used to
    /// display the current mode; real requests never wait on it.
    pub async fn is_reachable(&self) -> bool {
        let Ok(url) = self.endpoint(&["health"]) else {
            return false;
        };
        match self.client.get(url).timeout(REACHABILITY_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Backend reachability check failed: {}", e);
                false
            }
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> PortResult<T> {
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_status_error(status, response).await);
        }
        response.json::<T>().await.map_err(map_transport_error)
    }
}

fn map_transport_error(error: reqwest::Error) -> PortError {
    if error.is_builder() {
        PortError::Unexpected(error.to_string())
    } else if error.is_decode() {
        PortError::Unexpected(format!("Invalid response body: {error}"))
    } else {
        PortError::Connectivity(error.to_string())
    }
}

async fn map_status_error(status: StatusCode, response: Response) -> PortError {
    let body = response.bytes().await.unwrap_or_default();
    let parsed: Option<ErrorBody> = serde_json::from_slice(&body).ok();

    if let Some(ErrorBody {
        message,
        code: Some(code),
    }) = &parsed
    {
        return PortError::from_code(code, message.clone());
    }

    let message = match parsed {
        Some(body) => body.message,
        None if body.is_empty() => format!("status {}", status.as_u16()),
        None => String::from_utf8_lossy(&body).into_owned(),
    };

    match status {
        StatusCode::BAD_REQUEST => PortError::Validation(message),
        StatusCode::UNAUTHORIZED => PortError::Unauthorized(message),
        StatusCode::NOT_FOUND => PortError::NotFound(message),
        // A proxy answering for a backend that is down.
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            PortError::Connectivity(message)
        }
        _ => PortError::Unexpected(message),
    }
}

#[async_trait]
impl AttendanceStore for RemoteStore {
    async fn login(&self, request: &LoginRequest) -> PortResult<User> {
        let url = self.endpoint(&["login"])?;
        self.send(self.client.post(url).json(request)).await
    }

    async fn request_password_reset(&self, email: &str) -> PortResult<String> {
        let url = self.endpoint(&["forgot-password"])?;
        let body = PasswordResetRequest {
            email: email.to_string(),
        };
        let response: MessageResponse = self.send(self.client.post(url).json(&body)).await?;
        Ok(response.message)
    }

    async fn list_users(&self, role: Option<Role>) -> PortResult<Vec<User>> {
        let url = self.endpoint(&["users"])?;
        let mut request = self.client.get(url);
        if let Some(role) = role {
            request = request.query(&[("role", role.as_str())]);
        }
        self.send(request).await
    }

    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let url = self.endpoint(&["users"])?;
        self.send(self.client.post(url).json(&user)).await
    }

    async fn update_user(&self, id: &str, update: UserUpdate) -> PortResult<User> {
        let url = self.endpoint(&["users", id])?;
        self.send(self.client.put(url).json(&update)).await
    }

    async fn delete_user(&self, id: &str) -> PortResult<()> {
        let url = self.endpoint(&["users", id])?;
        let _: MessageResponse = self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn mark_attendance(&self, record: AttendanceRecord) -> PortResult<AttendanceRecord> {
        let url = self.endpoint(&["attendance"])?;
        self.send(self.client.post(url).json(&record)).await
    }

    async fn list_attendance(&self, query: &AttendanceQuery) -> PortResult<Vec<AttendanceRecord>> {
        let url = self.endpoint(&["attendance"])?;
        self.send(self.client.get(url).query(query)).await
    }

    async fn list_notices(&self, query: &NoticeQuery) -> PortResult<Vec<Notice>> {
        let url = self.endpoint(&["notices"])?;
        self.send(self.client.get(url).query(query)).await
    }

    async fn create_notice(&self, notice: Notice) -> PortResult<Notice> {
        let url = self.endpoint(&["notices"])?;
        self.send(self.client.post(url).json(&notice)).await
    }

    async fn update_notice(&self, id: &str, update: NoticeUpdate) -> PortResult<Notice> {
        let url = self.endpoint(&["notices", id])?;
        self.send(self.client.put(url).json(&update)).await
    }

    async fn delete_notice(&self, id: &str) -> PortResult<()> {
        let url = self.endpoint(&["notices", id])?;
        let _: MessageResponse = self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn get_settings(&self) -> PortResult<SystemSettings> {
        let url = self.endpoint(&["settings"])?;
        self.send(self.client.get(url)).await
    }

    async fn save_settings(&self, update: SettingsUpdate) -> PortResult<SystemSettings> {
        let url = self.endpoint(&["settings"])?;
        self.send(self.client.post(url).json(&update)).await
    }

    async fn connection_state(&self) -> StoreConnectionState {
        if self.is_reachable().await {
            StoreConnectionState::Connected
        } else {
            StoreConnectionState::Disconnected
        }
    }
}
