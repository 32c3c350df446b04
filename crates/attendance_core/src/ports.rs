//! crates/attendance_core/src/ports.rs
//!
//! Defines the storage contract shared by every backend of the tracker.
//! The Postgres adapter on the server, the HTTP client, the local fallback
//! store and the fallback wrapper all implement `AttendanceStore`, so callers
//! pick an implementation at construction time instead of discovering it
//! from failures.

use async_trait::async_trait;

use crate::domain::{
    AttendanceQuery, AttendanceRecord, LoginRequest, Notice, NoticeQuery, NoticeUpdate, NewUser,
    Role, SettingsUpdate, StoreConnectionState, SystemSettings, User, UserUpdate,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The error type for all store operations.
///
/// `Connectivity` is the only variant a client may recover from by switching
/// to another store; every other variant is an application answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Duplicate(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("Unable to reach the server: {0}")]
    Connectivity(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// Stable discriminant carried in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PortError::Validation(_) => "validation",
            PortError::Duplicate(_) => "duplicate",
            PortError::NotFound(_) => "not_found",
            PortError::Unauthorized(_) => "unauthorized",
            PortError::Connectivity(_) => "connectivity",
            PortError::Unexpected(_) => "unexpected",
        }
    }

    /// Rebuilds an error from an API error body's code and message.
    pub fn from_code(code: &str, message: String) -> Self {
        match code {
            "validation" => PortError::Validation(message),
            "duplicate" => PortError::Duplicate(message),
            "not_found" => PortError::NotFound(message),
            "unauthorized" => PortError::Unauthorized(message),
            "connectivity" => PortError::Connectivity(message),
            _ => PortError::Unexpected(message),
        }
    }

    /// The message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            PortError::Validation(m)
            | PortError::Duplicate(m)
            | PortError::NotFound(m)
            | PortError::Unauthorized(m)
            | PortError::Connectivity(m)
            | PortError::Unexpected(m) => m,
        }
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, PortError::Connectivity(_))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Store Port
//=========================================================================================

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    // --- Credentials ---
    /// Returns the user whose email, password and role all match.
    async fn login(&self, request: &LoginRequest) -> PortResult<User>;

    /// Simulated reset; fails with `NotFound` when no account has this email.
    async fn request_password_reset(&self, email: &str) -> PortResult<String>;

    // --- User Management ---
    async fn list_users(&self, role: Option<Role>) -> PortResult<Vec<User>>;

    async fn create_user(&self, user: NewUser) -> PortResult<User>;

    async fn update_user(&self, id: &str, update: UserUpdate) -> PortResult<User>;

    async fn delete_user(&self, id: &str) -> PortResult<()>;

    // --- Attendance ---
    /// Stores a record unless one already exists for the same student,
    /// subject and date.
    async fn mark_attendance(&self, record: AttendanceRecord) -> PortResult<AttendanceRecord>;

    /// Matching records, newest first.
    async fn list_attendance(&self, query: &AttendanceQuery) -> PortResult<Vec<AttendanceRecord>>;

    // --- Notices ---
    /// Matching notices, newest first. A student filter returns only notices
    /// from teachers the student is enrolled under.
    async fn list_notices(&self, query: &NoticeQuery) -> PortResult<Vec<Notice>>;

    async fn create_notice(&self, notice: Notice) -> PortResult<Notice>;

    async fn update_notice(&self, id: &str, update: NoticeUpdate) -> PortResult<Notice>;

    async fn delete_notice(&self, id: &str) -> PortResult<()>;

    // --- Settings ---
    /// The settings singleton, created with defaults when absent.
    async fn get_settings(&self) -> PortResult<SystemSettings>;

    /// Upserts the settings singleton.
    async fn save_settings(&self, update: SettingsUpdate) -> PortResult<SystemSettings>;

    // --- Status ---
    async fn connection_state(&self) -> StoreConnectionState {
        StoreConnectionState::Connected
    }
}
