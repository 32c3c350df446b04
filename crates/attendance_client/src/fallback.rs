//! crates/attendance_client/src/fallback.rs
//!
//! `FallbackStore` runs every operation on a primary store and re-runs it on
//! a fallback store only when the primary fails with
//! `PortError::Connectivity`. The decision is made on the error variant, so
//! application errors (duplicates, missing ids, bad credentials) always reach
//! the caller unchanged.

use async_trait::async_trait;
use attendance_core::{
    AttendanceQuery, AttendanceRecord, AttendanceStore, LoginRequest, NewUser, Notice,
    NoticeQuery, NoticeUpdate, PortResult, Role, SettingsUpdate, StoreConnectionState,
    SystemSettings, User, UserUpdate,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{ClientConfig, StoreMode};
use crate::error::ClientError;
use crate::local::storage::FileStorage;
use crate::local::LocalStore;
use crate::remote::RemoteStore;

/// Where the next request is expected to be served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreLocation {
    Remote,
    Fallback,
}

pub struct FallbackStore {
    primary: Arc<dyn AttendanceStore>,
    fallback: Arc<dyn AttendanceStore>,
}

impl FallbackStore {
    pub fn new(primary: Arc<dyn AttendanceStore>, fallback: Arc<dyn AttendanceStore>) -> Self {
        Self { primary, fallback }
    }

    /// Checks the primary store so a UI can show which mode it is in.
    pub async fn location(&self) -> StoreLocation {
        match self.primary.connection_state().await {
            StoreConnectionState::Connected => StoreLocation::Remote,
            _ => StoreLocation::Fallback,
        }
    }
}

/// Runs `$call` against the primary store, then against the fallback store
/// if the first attempt failed with a connectivity error.
macro_rules! with_fallback {
    ($self:ident, $operation:literal, |$store:ident| $call:expr) => {{
        let $store = &$self.primary;
        match $call.await {
            Err(e) if e.is_connectivity() => {
                warn!(
                    "Backend unavailable during {}: {}. Switching to local fallback.",
                    $operation, e
                );
                let $store = &$self.fallback;
                $call.await
            }
            other => other,
        }
    }};
}

#[async_trait]
impl AttendanceStore for FallbackStore {
    async fn login(&self, request: &LoginRequest) -> PortResult<User> {
        with_fallback!(self, "login", |store| store.login(request))
    }

    async fn request_password_reset(&self, email: &str) -> PortResult<String> {
        with_fallback!(self, "password reset", |store| store
            .request_password_reset(email))
    }

    async fn list_users(&self, role: Option<Role>) -> PortResult<Vec<User>> {
        with_fallback!(self, "list users", |store| store.list_users(role))
    }

    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        with_fallback!(self, "create user", |store| store.create_user(user.clone()))
    }

    async fn update_user(&self, id: &str, update: UserUpdate) -> PortResult<User> {
        with_fallback!(self, "update user", |store| store
            .update_user(id, update.clone()))
    }

    async fn delete_user(&self, id: &str) -> PortResult<()> {
        with_fallback!(self, "delete user", |store| store.delete_user(id))
    }

    async fn mark_attendance(&self, record: AttendanceRecord) -> PortResult<AttendanceRecord> {
        with_fallback!(self, "mark attendance", |store| store
            .mark_attendance(record.clone()))
    }

    async fn list_attendance(&self, query: &AttendanceQuery) -> PortResult<Vec<AttendanceRecord>> {
        with_fallback!(self, "list attendance", |store| store.list_attendance(query))
    }

    async fn list_notices(&self, query: &NoticeQuery) -> PortResult<Vec<Notice>> {
        with_fallback!(self, "list notices", |store| store.list_notices(query))
    }

    async fn create_notice(&self, notice: Notice) -> PortResult<Notice> {
        with_fallback!(self, "create notice", |store| store
            .create_notice(notice.clone()))
    }

    async fn update_notice(&self, id: &str, update: NoticeUpdate) -> PortResult<Notice> {
        with_fallback!(self, "update notice", |store| store
            .update_notice(id, update.clone()))
    }

    async fn delete_notice(&self, id: &str) -> PortResult<()> {
        with_fallback!(self, "delete notice", |store| store.delete_notice(id))
    }

    async fn get_settings(&self) -> PortResult<SystemSettings> {
        with_fallback!(self, "get settings", |store| store.get_settings())
    }

    async fn save_settings(&self, update: SettingsUpdate) -> PortResult<SystemSettings> {
        with_fallback!(self, "save settings", |store| store
            .save_settings(update.clone()))
    }

    async fn connection_state(&self) -> StoreConnectionState {
        self.primary.connection_state().await
    }
}

/// Builds the store selected by `config.store_mode`.
pub fn connect(config: &ClientConfig) -> Result<Arc<dyn AttendanceStore>, ClientError> {
    let store: Arc<dyn AttendanceStore> = match config.store_mode {
        StoreMode::Remote => Arc::new(remote_store(config)?),
        StoreMode::Local => Arc::new(local_store(config)?),
        StoreMode::Fallback => Arc::new(FallbackStore::new(
            Arc::new(remote_store(config)?),
            Arc::new(local_store(config)?),
        )),
    };
    info!(
        "Data-access client ready in {:?} mode against {}",
        config.store_mode, config.api_url
    );
    Ok(store)
}

fn remote_store(config: &ClientConfig) -> Result<RemoteStore, ClientError> {
    RemoteStore::new(&config.api_url, config.request_timeout)
}

fn local_store(config: &ClientConfig) -> Result<LocalStore, ClientError> {
    let storage = FileStorage::open(&config.local_store_dir)?;
    Ok(LocalStore::new(Arc::new(storage))
        .with_latency(config.fallback_latency)
        .with_admin(config.admin.clone()))
}
