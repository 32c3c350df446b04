//! Drives the real router over HTTP, backed by an in-memory store.

use api_lib::config::Config;
use api_lib::web::{self, AppState};
use attendance_client::{LocalStore, MemoryStorage, RemoteStore};
use attendance_core::{
    AdminSeed, AttendanceQuery, AttendanceRecord, AttendanceStatus, AttendanceStore, ErrorBody,
    HealthStatus, LoginRequest, NewUser, Notice, NoticeQuery, PortError, Role, SettingsUpdate,
    StoreConnectionState, UserUpdate,
};
use std::sync::Arc;
use std::time::Duration;

struct TestServer {
    base_url: String,
    http: reqwest::Client,
}

impl TestServer {
    fn store(&self) -> RemoteStore {
        RemoteStore::new(&self.base_url, Duration::from_secs(5)).unwrap()
    }
}

async fn spawn_server() -> TestServer {
    let config = Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://unused/attendance".to_string()),
        _ => None,
    })
    .unwrap();
    let local = LocalStore::new(Arc::new(MemoryStorage::new())).with_latency(Duration::ZERO);
    let state = Arc::new(AppState::new(Arc::new(local), Arc::new(config)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, web::router(state)).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{addr}/api"),
        http: reqwest::Client::new(),
    }
}

fn teacher(id: &str, email: &str) -> NewUser {
    NewUser {
        id: id.to_string(),
        name: "Meera Iyer".to_string(),
        email: email.to_string(),
        password: "teach123".to_string(),
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
        name: "Asha Rao".to_string(),
        email: format!("{}@school.edu", id.to_lowercase()),
        password: "stud123".to_string(),
        role: Role::Student,
        subjects: Vec::new(),
        teacher_ids: teacher_ids.iter().map(|t| t.to_string()).collect(),
        cie: None,
        created_at: None,
    }
}

fn mark(id: &str) -> AttendanceRecord {
    AttendanceRecord {
        id: id.to_string(),
        student_id: "STU1".to_string(),
        student_name: "Asha Rao".to_string(),
        teacher_id: "TC1".to_string(),
        subject: "Mathematics".to_string(),
        timestamp: 1_714_555_800_000,
        date: "2024-05-01".to_string(),
        status: AttendanceStatus::Present,
    }
}

fn notice(id: &str, teacher_id: &str, timestamp: i64) -> Notice {
    Notice {
        id: id.to_string(),
        teacher_id: teacher_id.to_string(),
        teacher_name: "Meera Iyer".to_string(),
        title: format!("Notice from {teacher_id}"),
        content: String::new(),
        attachments: Vec::new(),
        timestamp,
    }
}

#[tokio::test]
async fn unknown_credentials_are_unauthorized() {
    let server = spawn_server().await;

    let response = server
        .http
        .post(format!("{}/login", server.base_url))
        .json(&LoginRequest {
            email: "nobody@school.edu".to_string(),
            password: "wrong".to_string(),
            role: Role::Teacher,
        })
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.message, "Invalid credentials");
    assert_eq!(body.code.as_deref(), Some("unauthorized"));

    let admin = AdminSeed::default();
    let user = server
        .store()
        .login(&LoginRequest {
            email: admin.email.to_uppercase(),
            password: admin.password,
            role: Role::Admin,
        })
        .await
        .unwrap();
    assert_eq!(user.id, admin.id);
}

#[tokio::test]
async fn second_mark_for_the_same_day_is_rejected() {
    let server = spawn_server().await;
    let store = server.store();

    let first = server
        .http
        .post(format!("{}/attendance", server.base_url))
        .json(&mark("att-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), reqwest::StatusCode::CREATED);

    let err = store.mark_attendance(mark("att-2")).await.unwrap_err();
    assert_eq!(
        err,
        PortError::Duplicate("Attendance already marked for this subject today.".to_string())
    );

    let listed = store
        .list_attendance(&AttendanceQuery::for_student("STU1"))
        .await
        .unwrap();
    assert_eq!(listed, vec![mark("att-1")]);

    let filtered = store
        .list_attendance(&AttendanceQuery {
            subject: Some("All".to_string()),
            start_date: Some("2024-05-02".to_string()),
            ..AttendanceQuery::default()
        })
        .await
        .unwrap();
    assert!(filtered.is_empty());
}

#[tokio::test]
async fn deleting_an_unknown_user_leaves_the_list_alone() {
    let server = spawn_server().await;
    let store = server.store();
    let before = store.list_users(None).await.unwrap().len();

    let response = server
        .http
        .delete(format!("{}/users/ghost", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    assert!(matches!(
        store.delete_user("ghost").await,
        Err(PortError::NotFound(_))
    ));

    assert_eq!(store.list_users(None).await.unwrap().len(), before);
}

#[tokio::test]
async fn emails_stay_unique_across_create_and_update() {
    let server = spawn_server().await;
    let store = server.store();

    store
        .create_user(teacher("TC1", "meera@school.edu"))
        .await
        .unwrap();
    let created = store
        .create_user(teacher("TC2", "ravi@school.edu"))
        .await
        .unwrap();
    assert_eq!(created.email, "ravi@school.edu");

    let err = store
        .create_user(teacher("TC3", " MEERA@school.edu"))
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Duplicate(_)));

    let err = store
        .update_user(
            "TC2",
            UserUpdate {
                email: Some("meera@school.edu".to_string()),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Duplicate(_)));

    let teachers = store.list_users(Some(Role::Teacher)).await.unwrap();
    assert_eq!(teachers.len(), 2);
}

#[tokio::test]
async fn settings_round_trip() {
    let server = spawn_server().await;
    let store = server.store();

    let defaults = store.get_settings().await.unwrap();
    assert_eq!(defaults.school_name, "Smart Attendance");

    let saved = store
        .save_settings(SettingsUpdate {
            school_name: Some("Greenfield High".to_string()),
            ..SettingsUpdate::default()
        })
        .await
        .unwrap();
    assert_eq!(saved.school_name, "Greenfield High");
    assert_eq!(saved.academic_year, defaults.academic_year);
    assert_eq!(store.get_settings().await.unwrap(), saved);
}

#[tokio::test]
async fn students_see_only_their_teachers_notices() {
    let server = spawn_server().await;
    let store = server.store();

    store.create_user(student("STU1", &["TC1"])).await.unwrap();
    store.create_notice(notice("notice-1", "TC1", 1_000)).await.unwrap();
    store.create_notice(notice("notice-2", "TC2", 2_000)).await.unwrap();
    store.create_notice(notice("notice-3", "TC1", 3_000)).await.unwrap();

    let visible = store
        .list_notices(&NoticeQuery::for_student("STU1"))
        .await
        .unwrap();
    let ids: Vec<_> = visible.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, ["notice-3", "notice-1"]);

    store.delete_notice("notice-1").await.unwrap();
    assert!(matches!(
        store.delete_notice("notice-1").await,
        Err(PortError::NotFound(_))
    ));
}

#[tokio::test]
async fn health_reports_the_store_state() {
    let server = spawn_server().await;

    let health: HealthStatus = server
        .http
        .get(format!("{}/health", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.store_connection_state, StoreConnectionState::Connected);
    assert!(server.store().is_reachable().await);
}

#[tokio::test]
async fn password_reset_needs_a_known_email() {
    let server = spawn_server().await;
    let store = server.store();

    let err = store
        .request_password_reset("nobody@school.edu")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        PortError::NotFound("No account found with this email address.".to_string())
    );

    let message = store
        .request_password_reset(&AdminSeed::default().email)
        .await
        .unwrap();
    assert_eq!(
        message,
        "Password reset instructions have been sent to your email."
    );
}

#[tokio::test]
async fn malformed_requests_get_a_validation_body() {
    let server = spawn_server().await;

    let missing_password = server
        .http
        .post(format!("{}/users", server.base_url))
        .json(&serde_json::json!({
            "id": "TC9",
            "name": "No Password",
            "email": "tc9@school.edu",
            "role": "TEACHER"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_password.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: ErrorBody = missing_password.json().await.unwrap();
    assert_eq!(body.code.as_deref(), Some("validation"));
    assert!(body.message.contains("password"));

    let partial_mark = server
        .http
        .post(format!("{}/attendance", server.base_url))
        .json(&serde_json::json!({ "id": "att-1", "studentId": "STU1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(partial_mark.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: ErrorBody = partial_mark.json().await.unwrap();
    assert_eq!(body.code.as_deref(), Some("validation"));

    let bad_role = server
        .http
        .get(format!("{}/users?role=janitor", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_role.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: ErrorBody = bad_role.json().await.unwrap();
    assert_eq!(body.code.as_deref(), Some("validation"));
}
