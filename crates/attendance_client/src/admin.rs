//! crates/attendance_client/src/admin.rs
//!
//! The administrator's console: user management, attendance reports, system
//! settings and the backend connection indicator.

use attendance_core::stats::next_teacher_id;
use attendance_core::{
    AttendanceQuery, AttendanceRecord, AttendanceStore, NewUser, PortError, PortResult, Role,
    SettingsUpdate, StoreConnectionState, SystemSettings, User, UserUpdate,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::error::ClientError;
use crate::report::{self, AttendanceScope};

/// Ordering of the user list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserSort {
    #[default]
    Newest,
    Oldest,
    Name,
}

/// Search, role filter and ordering applied to the user list.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Matched against name, email and id, ignoring case.
    pub search: String,
    pub role: Option<Role>,
    pub sort: UserSort,
}

impl UserFilter {
    pub fn apply(&self, users: &[User]) -> Vec<User> {
        let term = self.search.trim().to_lowercase();
        let mut out: Vec<User> = users
            .iter()
            .filter(|u| self.role.map_or(true, |r| u.role == r))
            .filter(|u| {
                term.is_empty()
                    || u.name.to_lowercase().contains(&term)
                    || u.email.to_lowercase().contains(&term)
                    || u.id.to_lowercase().contains(&term)
            })
            .cloned()
            .collect();
        match self.sort {
            UserSort::Newest => out.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            UserSort::Oldest => out.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            UserSort::Name => out.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase())),
        }
        out
    }
}

/// Counts shown at the top of the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Overview {
    pub teachers: usize,
    pub students: usize,
    pub admins: usize,
}

pub struct AdminConsole {
    store: Arc<dyn AttendanceStore>,
    admin: User,
}

impl AdminConsole {
    pub fn new(store: Arc<dyn AttendanceStore>, admin: User) -> PortResult<Self> {
        if admin.role != Role::Admin {
            return Err(PortError::Unauthorized(
                "Only administrators can open the admin console".to_string(),
            ));
        }
        Ok(Self { store, admin })
    }

    pub fn admin(&self) -> &User {
        &self.admin
    }

    pub async fn users(&self, filter: &UserFilter) -> PortResult<Vec<User>> {
        let users = self.store.list_users(None).await?;
        Ok(filter.apply(&users))
    }

    pub async fn overview(&self) -> PortResult<Overview> {
        let users = self.store.list_users(None).await?;
        let count = |role: Role| users.iter().filter(|u| u.role == role).count();
        Ok(Overview {
            teachers: count(Role::Teacher),
            students: count(Role::Student),
            admins: count(Role::Admin),
        })
    }

    /// The id to prefill when adding a teacher.
    pub async fn next_teacher_id(&self) -> PortResult<String> {
        let users = self.store.list_users(Some(Role::Teacher)).await?;
        Ok(next_teacher_id(&users))
    }

    pub async fn create_user(&self, user: NewUser) -> PortResult<User> {
        if [&user.id, &user.name, &user.email, &user.password]
            .iter()
            .any(|v| v.trim().is_empty())
        {
            return Err(PortError::Validation(
                "All fields are required, including User ID".to_string(),
            ));
        }
        let existing = self.store.list_users(None).await?;
        if existing.iter().any(|u| u.id == user.id.trim()) {
            return Err(PortError::Duplicate(format!(
                "User ID \"{}\" already exists. Please use a unique ID.",
                user.id.trim()
            )));
        }
        let created = self.store.create_user(user).await?;
        info!("Admin {} created {} {}", self.admin.id, created.role, created.id);
        Ok(created)
    }

    /// Updates a user. `requested_id` is the id on the submitted form and must
    /// match the user being edited.
    pub async fn update_user(
        &self,
        id: &str,
        requested_id: &str,
        update: UserUpdate,
    ) -> PortResult<User> {
        if requested_id != id {
            return Err(PortError::Validation(
                "Changing User ID is not allowed.".to_string(),
            ));
        }
        self.store.update_user(id, update).await
    }

    pub async fn delete_user(&self, id: &str) -> PortResult<()> {
        self.store.delete_user(id).await?;
        info!("Admin {} deleted user {}", self.admin.id, id);
        Ok(())
    }

    /// Every record matching `query`, newest first.
    pub async fn attendance_report(
        &self,
        query: &AttendanceQuery,
    ) -> PortResult<Vec<AttendanceRecord>> {
        self.store.list_attendance(query).await
    }

    /// Writes the filtered attendance report as a PDF into `dir`.
    pub async fn export_attendance_report(
        &self,
        dir: &Path,
        query: &AttendanceQuery,
    ) -> Result<PathBuf, ClientError> {
        let records = self.attendance_report(query).await?;
        let today = report::today();
        let table = report::attendance_table(&records, query, AttendanceScope::School, today);
        report::export_pdf(dir, &report::attendance_report_file_name(today), &table)
    }

    /// Writes the users matching `filter`, administrators excluded.
    pub async fn export_user_directory(
        &self,
        dir: &Path,
        filter: &UserFilter,
    ) -> Result<PathBuf, ClientError> {
        let users = self.store.list_users(None).await?;
        let today = report::today();
        let table = report::user_directory_table(&users, filter, today);
        report::export_pdf(dir, &report::user_directory_file_name(today), &table)
    }

    pub async fn export_student_directory(&self, dir: &Path) -> Result<PathBuf, ClientError> {
        let students = self.store.list_users(Some(Role::Student)).await?;
        let today = report::today();
        let table = report::student_directory_table(&students, today);
        report::export_pdf(dir, &report::student_directory_file_name(today), &table)
    }

    pub async fn settings(&self) -> PortResult<SystemSettings> {
        self.store.get_settings().await
    }

    pub async fn save_settings(&self, settings: SystemSettings) -> PortResult<SystemSettings> {
        self.store.save_settings(SettingsUpdate::from(settings)).await
    }

    /// True when the configured backend answers.
    pub async fn backend_connected(&self) -> bool {
        self.store.connection_state().await == StoreConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::storage::MemoryStorage;
    use crate::local::LocalStore;
    use attendance_core::{AdminSeed, LoginRequest};
    use std::time::Duration;

    async fn console() -> (AdminConsole, Arc<dyn AttendanceStore>) {
        let store: Arc<dyn AttendanceStore> =
            Arc::new(LocalStore::new(Arc::new(MemoryStorage::new())).with_latency(Duration::ZERO));
        let seed = AdminSeed::default();
        let admin = store
            .login(&LoginRequest {
                email: seed.email,
                password: seed.password,
                role: Role::Admin,
            })
            .await
            .unwrap();
        (AdminConsole::new(store.clone(), admin).unwrap(), store)
    }

    fn teacher(id: &str, name: &str, created_at: i64) -> NewUser {
        NewUser {
            id: id.to_string(),
            name: name.to_string(),
            email: format!("{}@school.edu", id.to_lowercase()),
            password: "teach".to_string(),
            role: Role::Teacher,
            subjects: vec!["History".to_string()],
            teacher_ids: Vec::new(),
            cie: None,
            created_at: Some(created_at),
        }
    }

    #[tokio::test]
    async fn only_admins_open_the_console() {
        let (console, _) = console().await;
        let mut not_admin = console.admin().clone();
        not_admin.role = Role::Teacher;
        let store: Arc<dyn AttendanceStore> =
            Arc::new(LocalStore::new(Arc::new(MemoryStorage::new())).with_latency(Duration::ZERO));
        assert!(matches!(
            AdminConsole::new(store, not_admin),
            Err(PortError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn teacher_ids_are_generated_and_unique() {
        let (console, _) = console().await;
        assert_eq!(console.next_teacher_id().await.unwrap(), "TC1");

        console.create_user(teacher("TC1", "Meera", 10)).await.unwrap();
        assert_eq!(console.next_teacher_id().await.unwrap(), "TC2");

        let mut clash = teacher("TC1", "Other", 11);
        clash.email = "other@school.edu".to_string();
        let err = console.create_user(clash).await.unwrap_err();
        assert!(matches!(err, PortError::Duplicate(m) if m.contains("unique ID")));

        let mut blank = teacher("TC5", "Blank", 12);
        blank.password.clear();
        assert!(matches!(
            console.create_user(blank).await,
            Err(PortError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn user_list_filters_and_sorts() {
        let (console, _) = console().await;
        console.create_user(teacher("TC1", "Zara", 10)).await.unwrap();
        console.create_user(teacher("TC2", "Arjun", 20)).await.unwrap();

        let teachers = console
            .users(&UserFilter {
                role: Some(Role::Teacher),
                sort: UserSort::Name,
                ..UserFilter::default()
            })
            .await
            .unwrap();
        let names: Vec<&str> = teachers.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Arjun", "Zara"]);

        let found = console
            .users(&UserFilter {
                search: "TC1".to_string(),
                ..UserFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let overview = console.overview().await.unwrap();
        assert_eq!(overview, Overview { teachers: 2, students: 0, admins: 1 });
    }

    #[tokio::test]
    async fn ids_cannot_change_on_update() {
        let (console, _) = console().await;
        console.create_user(teacher("TC1", "Meera", 10)).await.unwrap();
        let err = console
            .update_user("TC1", "TC9", UserUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));

        let updated = console
            .update_user(
                "TC1",
                "TC1",
                UserUpdate {
                    subjects: Some(vec!["History".to_string(), "Physics".to_string()]),
                    ..UserUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.subjects.len(), 2);
    }

    #[tokio::test]
    async fn settings_round_trip_and_unknown_deletes_fail() {
        let (console, _) = console().await;
        let mut settings = console.settings().await.unwrap();
        settings.school_name = "Hillview High".to_string();
        console.save_settings(settings.clone()).await.unwrap();
        assert_eq!(console.settings().await.unwrap(), settings);

        assert!(matches!(
            console.delete_user("ghost").await,
            Err(PortError::NotFound(_))
        ));
        assert!(console.backend_connected().await);
    }

    #[tokio::test]
    async fn directories_and_reports_export_as_pdf() {
        let (console, _) = console().await;
        console.create_user(teacher("TC1", "Meera", 10)).await.unwrap();
        let dir = tempfile::tempdir().unwrap();

        let exports = [
            console
                .export_user_directory(dir.path(), &UserFilter::default())
                .await
                .unwrap(),
            console.export_student_directory(dir.path()).await.unwrap(),
            console
                .export_attendance_report(dir.path(), &AttendanceQuery::default())
                .await
                .unwrap(),
        ];
        let names: Vec<String> = exports
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names[0].starts_with("user_directory_"));
        assert!(names[1].starts_with("all_students_"));
        assert!(names[2].starts_with("attendance_report_"));
        for path in &exports {
            assert!(std::fs::read(path).unwrap().starts_with(b"%PDF"));
        }
    }
}
