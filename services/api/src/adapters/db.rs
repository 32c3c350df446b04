//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `AttendanceStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Uniqueness is enforced by the schema: a unique email constraint on `users`
//! and a compound unique constraint on `(student_id, subject, attendance_date)`
//! that attendance inserts target with `ON CONFLICT DO NOTHING`.

use async_trait::async_trait;
use attendance_core::credentials::{hash_password, verify_password};
use attendance_core::domain::{normalize_email, SETTINGS_ID};
use attendance_core::{
    AdminSeed, Attachment, AttendanceQuery, AttendanceRecord, AttendanceStore, Cie, LoginRequest,
    NewUser, Notice, NoticeQuery, NoticeUpdate, PortError, PortResult, Role, SettingsUpdate,
    StoreConnectionState, SystemSettings, User, UserUpdate,
};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::{error, info};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `AttendanceStore` port.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Creates the bootstrap admin unless a user with its email already exists.
    pub async fn seed_admin(&self, seed: &AdminSeed) -> PortResult<()> {
        let email = normalize_email(&seed.email);
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
            .bind(&email)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        if exists {
            return Ok(());
        }
        match self.create_user(seed.to_new_user()).await {
            Ok(_) => {
                info!("Seeded admin account {}", email);
                Ok(())
            }
            // Another instance seeded it first.
            Err(PortError::Duplicate(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn find_user(&self, id: &str) -> PortResult<UserRecord> {
        sqlx::query_as::<_, UserRecord>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| PortError::NotFound("User not found".to_string()))
    }

    async fn find_notice(&self, id: &str) -> PortResult<Notice> {
        sqlx::query_as::<_, NoticeRecord>(&format!(
            "SELECT {NOTICE_COLUMNS} FROM notices WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .map(NoticeRecord::to_domain)
        .ok_or_else(|| PortError::NotFound("Notice not found".to_string()))
    }

    /// The settings row, inserted with defaults on first access.
    async fn ensure_settings(&self) -> PortResult<SystemSettings> {
        let defaults = SystemSettings::default();
        sqlx::query(
            "INSERT INTO settings (id, school_name, academic_year, system_notification) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (id) DO NOTHING",
        )
        .bind(SETTINGS_ID)
        .bind(&defaults.school_name)
        .bind(&defaults.academic_year)
        .bind(&defaults.system_notification)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        let record = sqlx::query_as::<_, SettingsRecord>(
            "SELECT school_name, academic_year, system_notification FROM settings WHERE id = $1",
        )
        .bind(SETTINGS_ID)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(record.to_domain())
    }
}

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Maps a driver error onto the port's error type. Unique violations are
/// application answers; anything else is logged and surfaced as unexpected.
fn db_error(e: sqlx::Error) -> PortError {
    insert_error("")(e)
}

/// Like `db_error`, naming `id` when an insert collides on a primary key.
fn insert_error(id: &str) -> impl FnOnce(sqlx::Error) -> PortError + '_ {
    move |e| {
        if let Some(db) = e.as_database_error() {
            if db.is_unique_violation() {
                let message = match db.constraint() {
                    Some("users_email_key") => "User with this email already exists".to_string(),
                    Some("users_pkey") => format!("User ID \"{id}\" already exists"),
                    Some("attendance_slot_key") => {
                        "Attendance already marked for this subject today.".to_string()
                    }
                    Some("attendance_pkey") => format!("Attendance record {id} already exists"),
                    Some("notices_pkey") => format!("Notice {id} already exists"),
                    _ => db.message().to_string(),
                };
                return PortError::Duplicate(message);
            }
        }
        error!("Database operation failed: {:?}", e);
        PortError::Unexpected(e.to_string())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str = "id, name, email, role, subjects, teacher_ids, cie, created_at";
const ATTENDANCE_COLUMNS: &str =
    "id, student_id, student_name, teacher_id, subject, marked_at, attendance_date, status";
const NOTICE_COLUMNS: &str = "id, teacher_id, teacher_name, title, content, attachments, posted_at";

#[derive(FromRow)]
struct UserRecord {
    id: String,
    name: String,
    email: String,
    role: String,
    subjects: Vec<String>,
    teacher_ids: Vec<String>,
    cie: Option<Json<Cie>>,
    created_at: i64,
}
impl UserRecord {
    fn to_domain(self) -> PortResult<User> {
        Ok(User {
            role: self.role.parse::<Role>()?,
            id: self.id,
            name: self.name,
            email: self.email,
            subjects: self.subjects,
            teacher_ids: self.teacher_ids,
            cie: self.cie.map(|c| c.0),
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct CredentialRecord {
    #[sqlx(flatten)]
    user: UserRecord,
    password_hash: String,
}

#[derive(FromRow)]
struct AttendanceRow {
    id: String,
    student_id: String,
    student_name: String,
    teacher_id: String,
    subject: String,
    marked_at: i64,
    attendance_date: String,
    status: String,
}
impl AttendanceRow {
    fn to_domain(self) -> PortResult<AttendanceRecord> {
        Ok(AttendanceRecord {
            status: self.status.parse()?,
            id: self.id,
            student_id: self.student_id,
            student_name: self.student_name,
            teacher_id: self.teacher_id,
            subject: self.subject,
            timestamp: self.marked_at,
            date: self.attendance_date,
        })
    }
}

#[derive(FromRow)]
struct NoticeRecord {
    id: String,
    teacher_id: String,
    teacher_name: String,
    title: String,
    content: String,
    attachments: Json<Vec<Attachment>>,
    posted_at: i64,
}
impl NoticeRecord {
    fn to_domain(self) -> Notice {
        Notice {
            id: self.id,
            teacher_id: self.teacher_id,
            teacher_name: self.teacher_name,
            title: self.title,
            content: self.content,
            attachments: self.attachments.0,
            timestamp: self.posted_at,
        }
    }
}

#[derive(FromRow)]
struct SettingsRecord {
    school_name: String,
    academic_year: String,
    system_notification: String,
}
impl SettingsRecord {
    fn to_domain(self) -> SystemSettings {
        SystemSettings {
            school_name: self.school_name,
            academic_year: self.academic_year,
            system_notification: self.system_notification,
        }
    }
}

//=========================================================================================
// `AttendanceStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AttendanceStore for PgStore {
    async fn login(&self, request: &LoginRequest) -> PortResult<User> {
        let record = sqlx::query_as::<_, CredentialRecord>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1 AND role = $2"
        ))
        .bind(normalize_email(&request.email))
        .bind(request.role.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        match record {
            Some(r) if verify_password(&request.password, &r.password_hash) => r.user.to_domain(),
            _ => Err(PortError::Unauthorized("Invalid credentials".to_string())),
        }
    }

    async fn request_password_reset(&self, email: &str) -> PortResult<String> {
        let email = normalize_email(email);
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
            .bind(&email)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        if !exists {
            return Err(PortError::NotFound(
                "No account found with this email address.".to_string(),
            ));
        }
        info!("Simulated password reset for {}", email);
        Ok("Password reset instructions have been sent to your email.".to_string())
    }

    async fn list_users(&self, role: Option<Role>) -> PortResult<Vec<User>> {
        let records = match role {
            Some(role) => {
                sqlx::query_as::<_, UserRecord>(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE role = $1 ORDER BY created_at ASC"
                ))
                .bind(role.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, UserRecord>(&format!(
                    "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db_error)?;
        records.into_iter().map(UserRecord::to_domain).collect()
    }

    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let (user, password) = user.into_user()?;
        let password_hash = hash_password(&password)?;
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (id, name, email, password_hash, role, subjects, teacher_ids, cie, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&password_hash)
        .bind(user.role.as_str())
        .bind(&user.subjects)
        .bind(&user.teacher_ids)
        .bind(user.cie.map(Json))
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(insert_error(&user.id))?;
        record.to_domain()
    }

    async fn update_user(&self, id: &str, update: UserUpdate) -> PortResult<User> {
        let mut user = self.find_user(id).await?.to_domain()?;
        update.apply(&mut user)?;
        let password_hash = update.new_password().map(hash_password).transpose()?;

        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "UPDATE users SET name = $2, email = $3, role = $4, subjects = $5, teacher_ids = $6, \
             cie = $7, password_hash = COALESCE($8, password_hash) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.subjects)
        .bind(&user.teacher_ids)
        .bind(user.cie.map(Json))
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| PortError::NotFound("User not found".to_string()))?;
        record.to_domain()
    }

    async fn delete_user(&self, id: &str) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    async fn mark_attendance(&self, record: AttendanceRecord) -> PortResult<AttendanceRecord> {
        record.validate()?;
        let inserted = sqlx::query_as::<_, AttendanceRow>(&format!(
            "INSERT INTO attendance ({ATTENDANCE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (student_id, subject, attendance_date) DO NOTHING \
             RETURNING {ATTENDANCE_COLUMNS}"
        ))
        .bind(&record.id)
        .bind(&record.student_id)
        .bind(&record.student_name)
        .bind(&record.teacher_id)
        .bind(&record.subject)
        .bind(record.timestamp)
        .bind(&record.date)
        .bind(record.status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(insert_error(&record.id))?;

        match inserted {
            Some(row) => row.to_domain(),
            None => Err(PortError::Duplicate(
                "Attendance already marked for this subject today.".to_string(),
            )),
        }
    }

    async fn list_attendance(&self, query: &AttendanceQuery) -> PortResult<Vec<AttendanceRecord>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE TRUE"));
        if let Some(student_id) = query.student_filter() {
            builder.push(" AND student_id = ").push_bind(student_id.to_string());
        }
        if let Some(subject) = query.subject_filter() {
            builder.push(" AND subject = ").push_bind(subject.to_string());
        }
        if let Some(start) = query.start_filter() {
            builder.push(" AND attendance_date >= ").push_bind(start.to_string());
        }
        if let Some(end) = query.end_filter() {
            builder.push(" AND attendance_date <= ").push_bind(end.to_string());
        }
        builder.push(" ORDER BY marked_at DESC");

        let rows = builder
            .build_query_as::<AttendanceRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.into_iter().map(AttendanceRow::to_domain).collect()
    }

    async fn list_notices(&self, query: &NoticeQuery) -> PortResult<Vec<Notice>> {
        let records = if let Some(teacher_id) = &query.teacher_id {
            sqlx::query_as::<_, NoticeRecord>(&format!(
                "SELECT {NOTICE_COLUMNS} FROM notices WHERE teacher_id = $1 ORDER BY posted_at DESC"
            ))
            .bind(teacher_id)
            .fetch_all(&self.pool)
            .await
        } else if let Some(student_id) = &query.student_id {
            sqlx::query_as::<_, NoticeRecord>(&format!(
                "SELECT {NOTICE_COLUMNS} FROM notices \
                 WHERE teacher_id IN (SELECT unnest(teacher_ids) FROM users WHERE id = $1) \
                 ORDER BY posted_at DESC"
            ))
            .bind(student_id)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, NoticeRecord>(&format!(
                "SELECT {NOTICE_COLUMNS} FROM notices ORDER BY posted_at DESC"
            ))
            .fetch_all(&self.pool)
            .await
        }
        .map_err(db_error)?;
        Ok(records.into_iter().map(NoticeRecord::to_domain).collect())
    }

    async fn create_notice(&self, notice: Notice) -> PortResult<Notice> {
        notice.validate()?;
        let record = sqlx::query_as::<_, NoticeRecord>(&format!(
            "INSERT INTO notices ({NOTICE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {NOTICE_COLUMNS}"
        ))
        .bind(&notice.id)
        .bind(&notice.teacher_id)
        .bind(&notice.teacher_name)
        .bind(&notice.title)
        .bind(&notice.content)
        .bind(Json(&notice.attachments))
        .bind(notice.timestamp)
        .fetch_one(&self.pool)
        .await
        .map_err(insert_error(&notice.id))?;
        Ok(record.to_domain())
    }

    async fn update_notice(&self, id: &str, update: NoticeUpdate) -> PortResult<Notice> {
        let mut notice = self.find_notice(id).await?;
        update.apply(&mut notice)?;
        let record = sqlx::query_as::<_, NoticeRecord>(&format!(
            "UPDATE notices SET teacher_name = $2, title = $3, content = $4, attachments = $5 \
             WHERE id = $1 RETURNING {NOTICE_COLUMNS}"
        ))
        .bind(id)
        .bind(&notice.teacher_name)
        .bind(&notice.title)
        .bind(&notice.content)
        .bind(Json(&notice.attachments))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| PortError::NotFound("Notice not found".to_string()))?;
        Ok(record.to_domain())
    }

    async fn delete_notice(&self, id: &str) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM notices WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound("Notice not found".to_string()));
        }
        Ok(())
    }

    async fn get_settings(&self) -> PortResult<SystemSettings> {
        self.ensure_settings().await
    }

    async fn save_settings(&self, update: SettingsUpdate) -> PortResult<SystemSettings> {
        let mut settings = self.ensure_settings().await?;
        update.apply(&mut settings);
        let record = sqlx::query_as::<_, SettingsRecord>(
            "INSERT INTO settings (id, school_name, academic_year, system_notification) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET school_name = EXCLUDED.school_name, \
             academic_year = EXCLUDED.academic_year, \
             system_notification = EXCLUDED.system_notification \
             RETURNING school_name, academic_year, system_notification",
        )
        .bind(SETTINGS_ID)
        .bind(&settings.school_name)
        .bind(&settings.academic_year)
        .bind(&settings.system_notification)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(record.to_domain())
    }

    async fn connection_state(&self) -> StoreConnectionState {
        if self.pool.is_closed() {
            return StoreConnectionState::Disconnected;
        }
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => StoreConnectionState::Connected,
            Err(e) => {
                error!("Database health check failed: {}", e);
                StoreConnectionState::Disconnected
            }
        }
    }
}
