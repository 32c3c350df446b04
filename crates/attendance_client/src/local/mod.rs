//! crates/attendance_client/src/local/mod.rs
//!
//! The local fallback store. It keeps each collection as one serialized list
//! in a `KeyValueStorage` and re-implements every invariant the server store
//! enforces with linear scans, since there is no query engine underneath.
//! Every operation waits a configured latency first so callers see the same
//! loading behaviour in both modes.

pub mod storage;

use async_trait::async_trait;
use attendance_core::credentials::{hash_password, verify_password};
use attendance_core::domain::normalize_email;
use attendance_core::{
    AdminSeed, AttendanceQuery, AttendanceRecord, AttendanceStore, LoginRequest, NewUser, Notice,
    NoticeQuery, NoticeUpdate, PortError, PortResult, Role, SettingsUpdate, SystemSettings, User,
    UserUpdate,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use self::storage::{KeyValueStorage, ATTENDANCE_KEY, NOTICES_KEY, SETTINGS_KEY, USERS_KEY};

/// Default delay applied before every local operation.
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(600);

/// A user as persisted locally, with its password hash next to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredUser {
    #[serde(flatten)]
    user: User,
    password_hash: String,
}

pub struct LocalStore {
    storage: Arc<dyn KeyValueStorage>,
    latency: Duration,
    admin: AdminSeed,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Creates a store over `storage` with the default latency and admin seed.
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            latency: DEFAULT_LATENCY,
            admin: AdminSeed::default(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_admin(mut self, admin: AdminSeed) -> Self {
        self.admin = admin;
        self
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn raw(&self, key: &str) -> PortResult<Option<String>> {
        self.storage
            .get(key)
            .map_err(|e| PortError::Unexpected(format!("Failed to read {key}: {e}")))
    }

    /// Copies an entry that could not be read in full to `<key>_unreadable`
    /// before anything is written over it.
    fn preserve_unreadable(&self, key: &str, raw: &str) -> PortResult<()> {
        let backup = format!("{key}_unreadable");
        self.storage
            .set(&backup, raw)
            .map_err(|e| PortError::Unexpected(format!("Failed to write {backup}: {e}")))?;
        warn!("Kept a copy of unreadable local entry {} as {}", key, backup);
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> PortResult<Option<T>> {
        let Some(raw) = self.raw(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Discarding unreadable local entry {}: {}", key, e);
                self.preserve_unreadable(key, &raw)?;
                Ok(None)
            }
        }
    }

    /// Reads a collection element by element. Elements that fail to decode
    /// are skipped, and the original entry is preserved first.
    fn read_list<T: DeserializeOwned>(&self, key: &str) -> PortResult<Vec<T>> {
        let Some(raw) = self.raw(key)? else {
            return Ok(Vec::new());
        };
        let values: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(values) => values,
            Err(e) => {
                warn!("Discarding unreadable local entry {}: {}", key, e);
                self.preserve_unreadable(key, &raw)?;
                return Ok(Vec::new());
            }
        };

        let total = values.len();
        let items: Vec<T> = values
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match serde_json::from_value(value) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!("Skipping unreadable element {} of {}: {}", index, key, e);
                    None
                }
            })
            .collect();
        if items.len() != total {
            self.preserve_unreadable(key, &raw)?;
        }
        Ok(items)
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> PortResult<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| PortError::Unexpected(format!("Failed to encode {key}: {e}")))?;
        self.storage
            .set(key, &raw)
            .map_err(|e| PortError::Unexpected(format!("Failed to write {key}: {e}")))?;
        debug!("Persisted local entry {}", key);
        Ok(())
    }

    /// Loads the users, seeding the bootstrap admin when it is missing.
    fn load_users(&self) -> PortResult<Vec<StoredUser>> {
        let mut users: Vec<StoredUser> = self.read_list(USERS_KEY)?;
        let admin_email = normalize_email(&self.admin.email);
        if !users.iter().any(|u| u.user.email == admin_email) {
            let (user, password) = self.admin.to_new_user().into_user()?;
            users.push(StoredUser {
                user,
                password_hash: hash_password(&password)?,
            });
            self.write(USERS_KEY, &users)?;
            info!("Seeded local admin account {}", admin_email);
        }
        Ok(users)
    }

    fn load_attendance(&self) -> PortResult<Vec<AttendanceRecord>> {
        self.read_list(ATTENDANCE_KEY)
    }

    fn load_notices(&self) -> PortResult<Vec<Notice>> {
        self.read_list(NOTICES_KEY)
    }

    fn load_settings(&self) -> PortResult<Option<SystemSettings>> {
        self.read(SETTINGS_KEY)
    }
}

fn duplicate_email() -> PortError {
    PortError::Duplicate("User with this email already exists".to_string())
}

#[async_trait]
impl AttendanceStore for LocalStore {
    async fn login(&self, request: &LoginRequest) -> PortResult<User> {
        self.simulate_latency().await;
        let email = normalize_email(&request.email);
        let _guard = self.write_lock.lock().await;
        self.load_users()?
            .into_iter()
            .find(|u| {
                u.user.email == email
                    && u.user.role == request.role
                    && verify_password(&request.password, &u.password_hash)
            })
            .map(|u| u.user)
            .ok_or_else(|| PortError::Unauthorized("Invalid credentials".to_string()))
    }

    async fn request_password_reset(&self, email: &str) -> PortResult<String> {
        self.simulate_latency().await;
        let email = normalize_email(email);
        let _guard = self.write_lock.lock().await;
        if !self.load_users()?.iter().any(|u| u.user.email == email) {
            return Err(PortError::NotFound(
                "No account found with this email address.".to_string(),
            ));
        }
        info!("Simulated password reset for {}", email);
        Ok("Password reset instructions have been sent to your email.".to_string())
    }

    async fn list_users(&self, role: Option<Role>) -> PortResult<Vec<User>> {
        self.simulate_latency().await;
        let _guard = self.write_lock.lock().await;
        Ok(self
            .load_users()?
            .into_iter()
            .map(|u| u.user)
            .filter(|u| role.map_or(true, |r| u.role == r))
            .collect())
    }

    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        self.simulate_latency().await;
        let (user, password) = user.into_user()?;
        let _guard = self.write_lock.lock().await;
        let mut users = self.load_users()?;
        if users.iter().any(|u| u.user.email == user.email) {
            return Err(duplicate_email());
        }
        if users.iter().any(|u| u.user.id == user.id) {
            return Err(PortError::Duplicate(format!(
                "User ID \"{}\" already exists",
                user.id
            )));
        }
        users.push(StoredUser {
            user: user.clone(),
            password_hash: hash_password(&password)?,
        });
        self.write(USERS_KEY, &users)?;
        Ok(user)
    }

    async fn update_user(&self, id: &str, update: UserUpdate) -> PortResult<User> {
        self.simulate_latency().await;
        let _guard = self.write_lock.lock().await;
        let mut users = self.load_users()?;
        let index = users
            .iter()
            .position(|u| u.user.id == id)
            .ok_or_else(|| PortError::NotFound("User not found".to_string()))?;

        if let Some(email) = update.normalized_email() {
            if users.iter().any(|u| u.user.id != id && u.user.email == email) {
                return Err(duplicate_email());
            }
        }

        let new_hash = update.new_password().map(hash_password).transpose()?;
        let stored = &mut users[index];
        update.apply(&mut stored.user)?;
        if let Some(hash) = new_hash {
            stored.password_hash = hash;
        }
        let updated = stored.user.clone();
        self.write(USERS_KEY, &users)?;
        Ok(updated)
    }

    async fn delete_user(&self, id: &str) -> PortResult<()> {
        self.simulate_latency().await;
        let _guard = self.write_lock.lock().await;
        let mut users = self.load_users()?;
        let before = users.len();
        users.retain(|u| u.user.id != id);
        if users.len() == before {
            return Err(PortError::NotFound("User not found".to_string()));
        }
        self.write(USERS_KEY, &users)
    }

    async fn mark_attendance(&self, record: AttendanceRecord) -> PortResult<AttendanceRecord> {
        self.simulate_latency().await;
        record.validate()?;
        let _guard = self.write_lock.lock().await;
        let mut records = self.load_attendance()?;
        if records.iter().any(|r| r.same_slot(&record)) {
            return Err(PortError::Duplicate(
                "Attendance already marked for this subject today.".to_string(),
            ));
        }
        if records.iter().any(|r| r.id == record.id) {
            return Err(PortError::Duplicate(format!(
                "Attendance record {} already exists",
                record.id
            )));
        }
        records.push(record.clone());
        self.write(ATTENDANCE_KEY, &records)?;
        Ok(record)
    }

    async fn list_attendance(&self, query: &AttendanceQuery) -> PortResult<Vec<AttendanceRecord>> {
        self.simulate_latency().await;
        let mut records: Vec<AttendanceRecord> = self
            .load_attendance()?
            .into_iter()
            .filter(|r| query.matches(r))
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    async fn list_notices(&self, query: &NoticeQuery) -> PortResult<Vec<Notice>> {
        self.simulate_latency().await;
        let _guard = self.write_lock.lock().await;
        let notices = self.load_notices()?;
        let mut notices: Vec<Notice> = if let Some(teacher_id) = &query.teacher_id {
            notices
                .into_iter()
                .filter(|n| &n.teacher_id == teacher_id)
                .collect()
        } else if let Some(student_id) = &query.student_id {
            let teacher_ids = self
                .load_users()?
                .into_iter()
                .find(|u| &u.user.id == student_id)
                .map(|u| u.user.teacher_ids)
                .unwrap_or_default();
            notices
                .into_iter()
                .filter(|n| teacher_ids.contains(&n.teacher_id))
                .collect()
        } else {
            notices
        };
        notices.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(notices)
    }

    async fn create_notice(&self, notice: Notice) -> PortResult<Notice> {
        self.simulate_latency().await;
        notice.validate()?;
        let _guard = self.write_lock.lock().await;
        let mut notices = self.load_notices()?;
        if notices.iter().any(|n| n.id == notice.id) {
            return Err(PortError::Duplicate(format!(
                "Notice {} already exists",
                notice.id
            )));
        }
        notices.push(notice.clone());
        self.write(NOTICES_KEY, &notices)?;
        Ok(notice)
    }

    async fn update_notice(&self, id: &str, update: NoticeUpdate) -> PortResult<Notice> {
        self.simulate_latency().await;
        let _guard = self.write_lock.lock().await;
        let mut notices = self.load_notices()?;
        let notice = notices
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| PortError::NotFound("Notice not found".to_string()))?;
        update.apply(notice)?;
        let updated = notice.clone();
        self.write(NOTICES_KEY, &notices)?;
        Ok(updated)
    }

    async fn delete_notice(&self, id: &str) -> PortResult<()> {
        self.simulate_latency().await;
        let _guard = self.write_lock.lock().await;
        let mut notices = self.load_notices()?;
        let before = notices.len();
        notices.retain(|n| n.id != id);
        if notices.len() == before {
            return Err(PortError::NotFound("Notice not found".to_string()));
        }
        self.write(NOTICES_KEY, &notices)
    }

    async fn get_settings(&self) -> PortResult<SystemSettings> {
        self.simulate_latency().await;
        let _guard = self.write_lock.lock().await;
        match self.load_settings()? {
            Some(settings) => Ok(settings),
            None => {
                let settings = SystemSettings::default();
                self.write(SETTINGS_KEY, &settings)?;
                Ok(settings)
            }
        }
    }

    async fn save_settings(&self, update: SettingsUpdate) -> PortResult<SystemSettings> {
        self.simulate_latency().await;
        let _guard = self.write_lock.lock().await;
        let mut settings = self.load_settings()?.unwrap_or_default();
        update.apply(&mut settings);
        self.write(SETTINGS_KEY, &settings)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::storage::MemoryStorage;
    use super::*;
    use attendance_core::{AttendanceStatus, Cie};

    fn store() -> LocalStore {
        store_over(Arc::new(MemoryStorage::new()))
    }

    fn store_over(storage: Arc<MemoryStorage>) -> LocalStore {
        LocalStore::new(storage).with_latency(Duration::ZERO)
    }

    fn teacher(id: &str, email: &str) -> NewUser {
        NewUser {
            id: id.to_string(),
            name: format!("Teacher {id}"),
            email: email.to_string(),
            password: "teach".to_string(),
            role: Role::Teacher,
            subjects: vec!["Mathematics".to_string()],
            teacher_ids: Vec::new(),
            cie: None,
            created_at: None,
        }
    }

    fn student(id: &str, teacher_ids: &[&str]) -> NewUser {
        NewUser {
            id: id.to_string(),
            name: format!("Student {id}"),
            email: format!("{id}@school.edu"),
            password: "learn".to_string(),
            role: Role::Student,
            subjects: Vec::new(),
            teacher_ids: teacher_ids.iter().map(|t| t.to_string()).collect(),
            cie: None,
            created_at: None,
        }
    }

    fn record(id: &str, student_id: &str, date: &str, timestamp: i64) -> AttendanceRecord {
        AttendanceRecord {
            id: id.to_string(),
            student_id: student_id.to_string(),
            student_name: format!("Student {student_id}"),
            teacher_id: "TC1".to_string(),
            subject: "Mathematics".to_string(),
            timestamp,
            date: date.to_string(),
            status: AttendanceStatus::Present,
        }
    }

    fn notice(id: &str, teacher_id: &str, timestamp: i64) -> Notice {
        Notice {
            id: id.to_string(),
            teacher_id: teacher_id.to_string(),
            teacher_name: format!("Teacher {teacher_id}"),
            title: format!("Notice {id}"),
            content: String::new(),
            attachments: Vec::new(),
            timestamp,
        }
    }

    #[tokio::test]
    async fn seeded_admin_can_log_in() {
        let store = store();
        let admins = store.list_users(Some(Role::Admin)).await.unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].id, "admin-001");

        let admin = store
            .login(&LoginRequest {
                email: " ADMIN@attendance.local".to_string(),
                password: "Admin@123".to_string(),
                role: Role::Admin,
            })
            .await
            .unwrap();
        assert_eq!(admin.name, "System Admin");
    }

    #[tokio::test]
    async fn login_requires_matching_role_and_password() {
        let store = store();
        store
            .create_user(teacher("TC1", "t1@school.edu"))
            .await
            .unwrap();

        for (password, role) in [("wrong", Role::Teacher), ("teach", Role::Student)] {
            let err = store
                .login(&LoginRequest {
                    email: "t1@school.edu".to_string(),
                    password: password.to_string(),
                    role,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, PortError::Unauthorized(_)));
        }
    }

    #[tokio::test]
    async fn email_and_id_are_unique() {
        let store = store();
        store
            .create_user(teacher("TC1", "t1@school.edu"))
            .await
            .unwrap();

        let err = store
            .create_user(teacher("TC2", "T1@School.edu"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Duplicate(_)));

        let err = store
            .create_user(teacher("TC1", "other@school.edu"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Duplicate(_)));

        store
            .create_user(teacher("TC2", "t2@school.edu"))
            .await
            .unwrap();
        let err = store
            .update_user(
                "TC2",
                UserUpdate {
                    email: Some("t1@school.edu".to_string()),
                    ..UserUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Duplicate(_)));
    }

    #[tokio::test]
    async fn update_merges_fields_and_rehashes_password() {
        let store = store();
        store.create_user(student("STU1", &["TC1"])).await.unwrap();
        let updated = store
            .update_user(
                "STU1",
                UserUpdate {
                    password: Some("new-pass".to_string()),
                    cie: Some(Cie {
                        cie1: 15,
                        assignment_submitted: true,
                        ..Cie::default()
                    }),
                    ..UserUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.teacher_ids, vec!["TC1"]);
        assert_eq!(updated.cie.unwrap().cie1, 15);

        let user = store
            .login(&LoginRequest {
                email: "STU1@school.edu".to_string(),
                password: "new-pass".to_string(),
                role: Role::Student,
            })
            .await
            .unwrap();
        assert_eq!(user.id, "STU1");
    }

    #[tokio::test]
    async fn deleting_an_unknown_user_leaves_the_collection_alone() {
        let store = store();
        store.create_user(student("STU1", &[])).await.unwrap();
        let before = store.list_users(None).await.unwrap().len();

        let err = store.delete_user("ghost").await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
        assert_eq!(store.list_users(None).await.unwrap().len(), before);

        store.delete_user("STU1").await.unwrap();
        assert_eq!(store.list_users(None).await.unwrap().len(), before - 1);
    }

    #[tokio::test]
    async fn attendance_slot_is_marked_once() {
        let store = store();
        store
            .mark_attendance(record("att-1", "STU1", "2024-05-01", 10))
            .await
            .unwrap();
        let err = store
            .mark_attendance(record("att-2", "STU1", "2024-05-01", 20))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Duplicate(_)));

        store
            .mark_attendance(record("att-3", "STU1", "2024-05-02", 30))
            .await
            .unwrap();
        let listed = store
            .list_attendance(&AttendanceQuery::for_student("STU1"))
            .await
            .unwrap();
        let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["att-3", "att-1"]);
    }

    #[tokio::test]
    async fn students_only_see_notices_from_their_teachers() {
        let store = store();
        store.create_user(student("STU1", &["TC1"])).await.unwrap();
        store.create_user(student("STU2", &[])).await.unwrap();
        store.create_notice(notice("n1", "TC1", 1)).await.unwrap();
        store.create_notice(notice("n2", "TC2", 2)).await.unwrap();
        store.create_notice(notice("n3", "TC1", 3)).await.unwrap();

        let seen = store
            .list_notices(&NoticeQuery::for_student("STU1"))
            .await
            .unwrap();
        let ids: Vec<&str> = seen.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n3", "n1"]);

        assert!(store
            .list_notices(&NoticeQuery::for_student("STU2"))
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .list_notices(&NoticeQuery::for_student("nobody"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn notice_update_and_delete_report_missing_ids() {
        let store = store();
        store.create_notice(notice("n1", "TC1", 1)).await.unwrap();
        let updated = store
            .update_notice(
                "n1",
                NoticeUpdate {
                    content: Some("Bring lab coats".to_string()),
                    ..NoticeUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.content, "Bring lab coats");

        let err = store
            .update_notice("n9", NoticeUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
        assert!(matches!(
            store.delete_notice("n9").await,
            Err(PortError::NotFound(_))
        ));
        store.delete_notice("n1").await.unwrap();
    }

    #[tokio::test]
    async fn settings_default_then_round_trip() {
        let store = store();
        assert_eq!(store.get_settings().await.unwrap(), SystemSettings::default());

        let wanted = SystemSettings {
            school_name: "Hillside High".to_string(),
            academic_year: "2025-2026".to_string(),
            system_notification: "Exams start Monday".to_string(),
        };
        store.save_settings(wanted.clone().into()).await.unwrap();
        assert_eq!(store.get_settings().await.unwrap(), wanted);
    }

    #[tokio::test]
    async fn corrupt_entries_read_as_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(ATTENDANCE_KEY, "{not json").unwrap();
        let store = LocalStore::new(storage.clone()).with_latency(Duration::ZERO);
        assert!(store
            .list_attendance(&AttendanceQuery::default())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            storage.get("sa_attendance_unreadable").unwrap().as_deref(),
            Some("{not json")
        );
    }

    #[tokio::test]
    async fn one_bad_user_does_not_erase_the_others() {
        let storage = Arc::new(MemoryStorage::new());
        let seeded = store_over(storage.clone());
        seeded.create_user(teacher("TC1", "tc1@school.edu")).await.unwrap();

        let mut entries: Vec<serde_json::Value> =
            serde_json::from_str(&storage.get(USERS_KEY).unwrap().unwrap()).unwrap();
        let mut broken = entries[0].clone();
        broken["id"] = serde_json::json!("STU9");
        broken["email"] = serde_json::json!("stu9@school.edu");
        broken["role"] = serde_json::json!("student");
        entries.push(broken);
        let raw = serde_json::to_string(&entries).unwrap();
        storage.set(USERS_KEY, &raw).unwrap();

        let reopened = store_over(storage.clone());
        let ids: Vec<String> = reopened
            .list_users(None)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert!(ids.contains(&"TC1".to_string()));
        assert!(ids.contains(&"admin-001".to_string()));
        assert!(!ids.contains(&"STU9".to_string()));
        assert_eq!(
            storage.get("sa_users_unreadable").unwrap().as_deref(),
            Some(raw.as_str())
        );
    }
}
