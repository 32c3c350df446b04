//! crates/attendance_core/src/domain.rs
//!
//! Defines the core data structures for the attendance tracker.
//! These structs are shared by the server, the remote client and the local
//! fallback store, so their serde shape is the JSON contract: camelCase field
//! names, SCREAMING_SNAKE_CASE enum values.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};

use crate::ports::{PortError, PortResult};

/// Identifier of the single `SystemSettings` record.
pub const SETTINGS_ID: &str = "global";

/// Calendar date format used by `AttendanceRecord::date` and report filters.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Milliseconds since the Unix epoch, the timestamp unit of every record.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Emails are compared and stored trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn require(field: &str, value: &str) -> PortResult<()> {
    if value.trim().is_empty() {
        return Err(PortError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Trims entries, drops blanks and keeps the first occurrence of each value.
fn dedup_trimmed(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim().to_string();
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

//=========================================================================================
// Users
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Teacher => "TEACHER",
            Role::Student => "STUDENT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "TEACHER" => Ok(Role::Teacher),
            "STUDENT" => Ok(Role::Student),
            other => Err(PortError::Validation(format!("'{other}' is not a valid role"))),
        }
    }
}

/// Continuous internal evaluation marks for one student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Cie {
    pub cie1: u32,
    pub cie2: u32,
    pub assignment: u32,
    pub assignment_submitted: bool,
}

/// A user as every store returns it. Credentials never leave the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Subjects taught; only populated for teachers.
    #[serde(default)]
    pub subjects: Vec<String>,
    /// Teachers a student is enrolled under; only populated for students.
    #[serde(default)]
    pub teacher_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cie: Option<Cie>,
    pub created_at: i64,
}

impl User {
    /// True when this user is a student on `teacher_id`'s roster.
    pub fn is_enrolled_under(&self, teacher_id: &str) -> bool {
        self.role == Role::Student && self.teacher_ids.iter().any(|t| t == teacher_id)
    }

    /// Clears the role-specific fields that do not apply to this user's role.
    fn shape_for_role(&mut self) {
        match self.role {
            Role::Admin => {
                self.subjects.clear();
                self.teacher_ids.clear();
                self.cie = None;
            }
            Role::Teacher => {
                self.teacher_ids.clear();
                self.cie = None;
            }
            Role::Student => {
                self.subjects.clear();
                self.cie.get_or_insert_with(Cie::default);
            }
        }
    }
}

/// Payload for creating a user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub teacher_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cie: Option<Cie>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl NewUser {
    /// Validates required fields and splits the payload into the stored user
    /// and its plaintext password.
    pub fn into_user(self) -> PortResult<(User, String)> {
        require("id", &self.id)?;
        require("name", &self.name)?;
        require("email", &self.email)?;
        require("password", &self.password)?;

        let mut user = User {
            id: self.id.trim().to_string(),
            name: self.name.trim().to_string(),
            email: normalize_email(&self.email),
            role: self.role,
            subjects: dedup_trimmed(self.subjects),
            teacher_ids: dedup_trimmed(self.teacher_ids),
            cie: self.cie,
            created_at: self.created_at.unwrap_or_else(now_millis),
        };
        user.shape_for_role();
        Ok((user, self.password))
    }
}

/// Partial update of a user. Absent fields keep their current value and an
/// empty password means "keep the current password".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subjects: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cie: Option<Cie>,
}

impl UserUpdate {
    /// The normalized email this update would set, if any.
    pub fn normalized_email(&self) -> Option<String> {
        self.email.as_deref().map(normalize_email)
    }

    /// The replacement password, ignoring blank values.
    pub fn new_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// Merges the update into `user`. The identifier is never touched.
    pub fn apply(&self, user: &mut User) -> PortResult<()> {
        if let Some(name) = &self.name {
            require("name", name)?;
            user.name = name.trim().to_string();
        }
        if let Some(email) = self.normalized_email() {
            require("email", &email)?;
            user.email = email;
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(subjects) = &self.subjects {
            user.subjects = dedup_trimmed(subjects.clone());
        }
        if let Some(teacher_ids) = &self.teacher_ids {
            user.teacher_ids = dedup_trimmed(teacher_ids.clone());
        }
        if let Some(cie) = self.cie {
            user.cie = Some(cie);
        }
        user.shape_for_role();
        Ok(())
    }
}

/// Credentials submitted to `POST /login`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// The bootstrap administrator created at first startup.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Default for AdminSeed {
    fn default() -> Self {
        Self {
            id: "admin-001".to_string(),
            name: "System Admin".to_string(),
            email: "admin@attendance.local".to_string(),
            password: "Admin@123".to_string(),
        }
    }
}

impl AdminSeed {
    pub fn to_new_user(&self) -> NewUser {
        NewUser {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            password: self.password.clone(),
            role: Role::Admin,
            subjects: Vec::new(),
            teacher_ids: Vec::new(),
            cie: None,
            created_at: None,
        }
    }
}

//=========================================================================================
// Attendance
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    #[default]
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "PRESENT",
            AttendanceStatus::Absent => "ABSENT",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PRESENT" => Ok(AttendanceStatus::Present),
            "ABSENT" => Ok(AttendanceStatus::Absent),
            other => Err(PortError::Validation(format!(
                "'{other}' is not a valid attendance status"
            ))),
        }
    }
}

/// One attendance mark. Append-only once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    /// Denormalized copy of the student's name at marking time.
    pub student_name: String,
    pub teacher_id: String,
    pub subject: String,
    pub timestamp: i64,
    /// `YYYY-MM-DD`, redundant with `timestamp` for cheap range filters.
    pub date: String,
    #[serde(default)]
    pub status: AttendanceStatus,
}

impl AttendanceRecord {
    pub fn validate(&self) -> PortResult<()> {
        require("id", &self.id)?;
        require("studentId", &self.student_id)?;
        require("studentName", &self.student_name)?;
        require("teacherId", &self.teacher_id)?;
        require("subject", &self.subject)?;
        parse_date(&self.date)?;
        Ok(())
    }

    /// True when both records mark the same student, subject and date.
    pub fn same_slot(&self, other: &AttendanceRecord) -> bool {
        self.student_id == other.student_id
            && self.subject == other.subject
            && self.date == other.date
    }
}

/// Parses a `YYYY-MM-DD` date, rejecting anything else as a validation error.
pub fn parse_date(date: &str) -> PortResult<NaiveDate> {
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|_| PortError::Validation(format!("'{date}' is not a YYYY-MM-DD date")))
}

/// Filters for `GET /attendance`. A subject of `All` means no subject filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl AttendanceQuery {
    pub fn for_student(student_id: impl Into<String>) -> Self {
        Self {
            student_id: Some(student_id.into()),
            ..Self::default()
        }
    }

    pub fn student_filter(&self) -> Option<&str> {
        self.student_id.as_deref().filter(|s| !s.is_empty())
    }

    pub fn subject_filter(&self) -> Option<&str> {
        self.subject
            .as_deref()
            .filter(|s| !s.is_empty() && *s != "All")
    }

    pub fn start_filter(&self) -> Option<&str> {
        self.start_date.as_deref().filter(|s| !s.is_empty())
    }

    pub fn end_filter(&self) -> Option<&str> {
        self.end_date.as_deref().filter(|s| !s.is_empty())
    }

    /// Date bounds are inclusive and compared as `YYYY-MM-DD` strings.
    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.student_filter().map_or(true, |s| record.student_id == s)
            && self.subject_filter().map_or(true, |s| record.subject == s)
            && self.start_filter().map_or(true, |d| record.date.as_str() >= d)
            && self.end_filter().map_or(true, |d| record.date.as_str() <= d)
    }
}

//=========================================================================================
// Notices
//=========================================================================================

/// A file attached to a notice, carried inline as base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Attachment {
    pub name: String,
    pub data: String,
    /// Size of the decoded file in bytes.
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: String,
    pub teacher_id: String,
    pub teacher_name: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default = "now_millis")]
    pub timestamp: i64,
}

impl Notice {
    pub fn validate(&self) -> PortResult<()> {
        require("id", &self.id)?;
        require("teacherId", &self.teacher_id)?;
        require("teacherName", &self.teacher_name)?;
        require("title", &self.title)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NoticeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

impl NoticeUpdate {
    pub fn apply(&self, notice: &mut Notice) -> PortResult<()> {
        if let Some(teacher_name) = &self.teacher_name {
            require("teacherName", teacher_name)?;
            notice.teacher_name = teacher_name.clone();
        }
        if let Some(title) = &self.title {
            require("title", title)?;
            notice.title = title.clone();
        }
        if let Some(content) = &self.content {
            notice.content = content.clone();
        }
        if let Some(attachments) = &self.attachments {
            notice.attachments = attachments.clone();
        }
        Ok(())
    }
}

/// Filters for `GET /notices`. `teacher_id` takes precedence over `student_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct NoticeQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

impl NoticeQuery {
    pub fn for_teacher(teacher_id: impl Into<String>) -> Self {
        Self {
            teacher_id: Some(teacher_id.into()),
            student_id: None,
        }
    }

    pub fn for_student(student_id: impl Into<String>) -> Self {
        Self {
            teacher_id: None,
            student_id: Some(student_id.into()),
        }
    }
}

//=========================================================================================
// Settings and service status
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    pub school_name: String,
    pub academic_year: String,
    pub system_notification: String,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            school_name: "Smart Attendance".to_string(),
            academic_year: "2024-2025".to_string(),
            system_notification: String::new(),
        }
    }
}

/// Upsert payload for `POST /settings`; absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub academic_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_notification: Option<String>,
}

impl SettingsUpdate {
    pub fn apply(self, settings: &mut SystemSettings) {
        if let Some(school_name) = self.school_name {
            settings.school_name = school_name;
        }
        if let Some(academic_year) = self.academic_year {
            settings.academic_year = academic_year;
        }
        if let Some(system_notification) = self.system_notification {
            settings.system_notification = system_notification;
        }
    }
}

impl From<SystemSettings> for SettingsUpdate {
    fn from(settings: SystemSettings) -> Self {
        Self {
            school_name: Some(settings.school_name),
            academic_year: Some(settings.academic_year),
            system_notification: Some(settings.system_notification),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StoreConnectionState {
    Disconnected,
    Connected,
    Connecting,
    Disconnecting,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub store_connection_state: StoreConnectionState,
    /// RFC 3339 time the status was produced.
    pub timestamp: String,
}

/// Plain `{ "message": ... }` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error body returned by the API; `code` is `PortError::code()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}
