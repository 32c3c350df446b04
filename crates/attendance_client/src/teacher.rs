//! crates/attendance_client/src/teacher.rs
//!
//! The teacher's desk: the class roster, attendance marking from QR scans or
//! by hand, CIE marks, attendance reports and notices.

use attendance_core::domain::{now_millis, parse_date, DATE_FORMAT};
use attendance_core::stats::{MarkField, MarksConfig};
use attendance_core::{
    Attachment, AttendanceQuery, AttendanceRecord, AttendanceStatus,
    AttendanceStore, Cie, NewUser, Notice, NoticeQuery, NoticeUpdate, PortError, PortResult,
    Role, User, UserUpdate,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::capture::Scanner;
use crate::error::ClientError;
use crate::report::{self, AttendanceScope};

/// Offered when a teacher has no subjects assigned.
pub const DEFAULT_SUBJECTS: [&str; 6] = [
    "Mathematics",
    "Physics",
    "Chemistry",
    "English Literature",
    "Computer Science",
    "History",
];

/// Combined size limit of the files attached to one notice.
pub const MAX_ATTACHMENT_BYTES: u64 = 5 * 1024 * 1024;

const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// The store could not be reached.
    Network,
    /// The store answered with an application error.
    Data,
    /// The camera could not be opened or stopped mid-scan.
    Camera,
}

/// Result of marking one student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Marked(AttendanceRecord),
    /// The scanned id is not on this teacher's roster; nothing was sent.
    NotInClassList,
    Rejected { kind: RejectionKind, message: String },
}

impl ScanOutcome {
    pub fn message(&self) -> String {
        match self {
            ScanOutcome::Marked(record) => match record.status {
                AttendanceStatus::Present => format!("Marked present: {}", record.student_name),
                AttendanceStatus::Absent => format!("Marked absent: {}", record.student_name),
            },
            ScanOutcome::NotInClassList => "Student not found in your class list.".to_string(),
            ScanOutcome::Rejected { message, .. } => message.clone(),
        }
    }
}

/// Today's tally for the selected subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DayStats {
    pub present: usize,
    pub absent: usize,
    pub total: usize,
}

/// The form a teacher fills in to add or edit a student.
#[derive(Debug, Clone, Default)]
pub struct StudentDraft {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Required for new students; blank on edit keeps the current password.
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct NoticeDraft {
    pub title: String,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

impl NoticeDraft {
    fn validate(&self) -> PortResult<()> {
        if self.title.trim().is_empty() || self.content.trim().is_empty() {
            return Err(PortError::Validation(
                "Title and Content are required".to_string(),
            ));
        }
        let total: u64 = self.attachments.iter().map(|a| a.size).sum();
        if total > MAX_ATTACHMENT_BYTES {
            return Err(PortError::Validation(
                "Total attachment size limit (5MB) exceeded.".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reads a PDF from disk into a base64 attachment.
pub fn load_attachment(path: &Path) -> Result<Attachment, ClientError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let is_pdf = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(ClientError::Attachment(
            name,
            "Only PDF files are allowed.".to_string(),
        ));
    }
    let bytes = std::fs::read(path)?;
    Ok(Attachment {
        name,
        data: STANDARD.encode(&bytes),
        size: bytes.len() as u64,
    })
}

pub struct TeacherDesk {
    store: Arc<dyn AttendanceStore>,
    teacher: User,
    roster: Vec<User>,
    subject: String,
    marks: MarksConfig,
}

impl TeacherDesk {
    /// Loads the roster for `teacher` and selects their first subject.
    pub async fn open(store: Arc<dyn AttendanceStore>, teacher: User) -> PortResult<Self> {
        if teacher.role != Role::Teacher {
            return Err(PortError::Unauthorized(
                "Only teachers can open the teacher desk".to_string(),
            ));
        }
        let mut desk = Self {
            store,
            subject: String::new(),
            teacher,
            roster: Vec::new(),
            marks: MarksConfig::default(),
        };
        desk.subject = desk.subjects().into_iter().next().unwrap_or_default();
        desk.refresh_roster().await?;
        Ok(desk)
    }

    pub fn with_marks_config(mut self, marks: MarksConfig) -> Self {
        self.marks = marks;
        self
    }

    pub fn teacher(&self) -> &User {
        &self.teacher
    }

    pub fn marks_config(&self) -> &MarksConfig {
        &self.marks
    }

    pub fn roster(&self) -> &[User] {
        &self.roster
    }

    pub fn subjects(&self) -> Vec<String> {
        if self.teacher.subjects.is_empty() {
            DEFAULT_SUBJECTS.iter().map(|s| s.to_string()).collect()
        } else {
            self.teacher.subjects.clone()
        }
    }

    pub fn selected_subject(&self) -> &str {
        &self.subject
    }

    pub fn select_subject(&mut self, subject: &str) -> PortResult<()> {
        if !self.subjects().iter().any(|s| s == subject) {
            return Err(PortError::Validation(format!(
                "'{subject}' is not one of your subjects"
            )));
        }
        self.subject = subject.to_string();
        Ok(())
    }

    pub async fn refresh_roster(&mut self) -> PortResult<()> {
        let students = self.store.list_users(Some(Role::Student)).await?;
        self.roster = students
            .into_iter()
            .filter(|s| s.is_enrolled_under(&self.teacher.id))
            .collect();
        Ok(())
    }

    /// Roster entries whose name or id contains `term`, ignoring case.
    pub fn search_roster(&self, term: &str) -> Vec<&User> {
        let term = term.trim().to_lowercase();
        self.roster
            .iter()
            .filter(|s| {
                term.is_empty()
                    || s.name.to_lowercase().contains(&term)
                    || s.id.to_lowercase().contains(&term)
            })
            .collect()
    }

    fn student(&self, id: &str) -> PortResult<&User> {
        self.roster
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| PortError::NotFound("Student not found.".to_string()))
    }

    // --- Roster management ---

    pub async fn add_student(&mut self, draft: StudentDraft) -> PortResult<User> {
        if [&draft.id, &draft.name, &draft.email, &draft.password]
            .iter()
            .any(|v| v.trim().is_empty())
        {
            return Err(PortError::Validation(
                "Please fill in all required fields. Password is required for new students."
                    .to_string(),
            ));
        }
        if self.roster.iter().any(|s| s.id == draft.id.trim()) {
            return Err(PortError::Duplicate(format!(
                "Student ID \"{}\" already exists in your class list.",
                draft.id.trim()
            )));
        }
        let student = self
            .store
            .create_user(NewUser {
                id: draft.id,
                name: draft.name,
                email: draft.email,
                password: draft.password,
                role: Role::Student,
                subjects: Vec::new(),
                teacher_ids: vec![self.teacher.id.clone()],
                cie: Some(Cie::default()),
                created_at: None,
            })
            .await?;
        info!("Teacher {} added student {}", self.teacher.id, student.id);
        self.roster.push(student.clone());
        Ok(student)
    }

    /// Updates name, email and (when given) password of a roster student.
    pub async fn edit_student(&mut self, id: &str, draft: StudentDraft) -> PortResult<User> {
        self.student(id)?;
        if draft.name.trim().is_empty() || draft.email.trim().is_empty() {
            return Err(PortError::Validation(
                "Please fill in all required fields.".to_string(),
            ));
        }
        let update = UserUpdate {
            name: Some(draft.name),
            email: Some(draft.email),
            password: Some(draft.password),
            ..UserUpdate::default()
        };
        let updated = self.store.update_user(id, update).await?;
        self.replace_in_roster(updated.clone());
        Ok(updated)
    }

    pub async fn remove_student(&mut self, id: &str) -> PortResult<()> {
        self.store.delete_user(id).await?;
        self.roster.retain(|s| s.id != id);
        Ok(())
    }

    fn replace_in_roster(&mut self, user: User) {
        if let Some(slot) = self.roster.iter_mut().find(|s| s.id == user.id) {
            *slot = user;
        }
    }

    // --- Attendance ---

    /// Marks the scanned student present for the selected subject today.
    pub async fn record_scan(&self, payload: &str) -> ScanOutcome {
        let Some(student) = self.roster.iter().find(|s| s.id == payload.trim()) else {
            warn!("Scanned id '{}' is not on the class list", payload.trim());
            return ScanOutcome::NotInClassList;
        };
        let now = Utc::now();
        let record = AttendanceRecord {
            id: format!("att-{}", Uuid::new_v4()),
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            teacher_id: self.teacher.id.clone(),
            subject: self.subject.clone(),
            timestamp: now.timestamp_millis(),
            date: now.date_naive().format(DATE_FORMAT).to_string(),
            status: AttendanceStatus::Present,
        };
        self.submit(record).await
    }

    /// Arms one scan session on `scanner` and marks the student it reads.
    /// Returns `None` when `cancel` fires before a code is recognized.
    pub async fn scan_and_mark(
        &self,
        scanner: &Scanner,
        cancel: CancellationToken,
    ) -> Option<ScanOutcome> {
        match scanner.scan(cancel).await {
            Ok(Some(payload)) => Some(self.record_scan(&payload).await),
            Ok(None) => None,
            Err(e) => Some(ScanOutcome::Rejected {
                kind: RejectionKind::Camera,
                message: e.user_message(),
            }),
        }
    }

    /// Marks a roster student at an explicit `YYYY-MM-DD` date and `HH:MM` time.
    pub async fn mark_manual(
        &self,
        student_id: &str,
        date: &str,
        time: &str,
        status: AttendanceStatus,
    ) -> ScanOutcome {
        if student_id.trim().is_empty() {
            return ScanOutcome::Rejected {
                kind: RejectionKind::Data,
                message: "Selection Required.".to_string(),
            };
        }
        let Some(student) = self.roster.iter().find(|s| s.id == student_id) else {
            return ScanOutcome::NotInClassList;
        };
        let timestamp = match manual_timestamp(date, time) {
            Ok(timestamp) => timestamp,
            Err(e) => {
                return ScanOutcome::Rejected {
                    kind: RejectionKind::Data,
                    message: e.message().to_string(),
                }
            }
        };
        let record = AttendanceRecord {
            id: format!("att-manual-{}", Uuid::new_v4()),
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            teacher_id: self.teacher.id.clone(),
            subject: self.subject.clone(),
            timestamp,
            date: date.to_string(),
            status,
        };
        self.submit(record).await
    }

    async fn submit(&self, record: AttendanceRecord) -> ScanOutcome {
        let student_name = record.student_name.clone();
        match self.store.mark_attendance(record).await {
            Ok(record) => {
                info!(
                    "Marked {} {} for {} on {}",
                    record.student_id, record.status, record.subject, record.date
                );
                ScanOutcome::Marked(record)
            }
            Err(e) => {
                warn!("Attendance for {} rejected: {}", student_name, e);
                self.rejection(e, &student_name)
            }
        }
    }

    fn rejection(&self, error: PortError, student_name: &str) -> ScanOutcome {
        match error {
            PortError::Connectivity(_) => ScanOutcome::Rejected {
                kind: RejectionKind::Network,
                message: "Network Error: Unable to connect to the server.".to_string(),
            },
            PortError::Duplicate(_) => ScanOutcome::Rejected {
                kind: RejectionKind::Data,
                message: format!(
                    "Duplicate: {} is already marked for {}.",
                    student_name, self.subject
                ),
            },
            other => ScanOutcome::Rejected {
                kind: RejectionKind::Data,
                message: other.message().to_string(),
            },
        }
    }

    /// Present and absent counts among roster students for the selected
    /// subject today.
    pub async fn today_stats(&self) -> PortResult<DayStats> {
        let today = Utc::now()
            .date_naive()
            .format(DATE_FORMAT)
            .to_string();
        let records = self
            .store
            .list_attendance(&AttendanceQuery {
                student_id: None,
                start_date: Some(today.clone()),
                end_date: Some(today),
                subject: Some(self.subject.clone()),
            })
            .await?;
        let mut stats = DayStats {
            total: self.roster.len(),
            ..DayStats::default()
        };
        for record in records.iter().filter(|r| self.is_own_student(&r.student_id)) {
            match record.status {
                AttendanceStatus::Present => stats.present += 1,
                AttendanceStatus::Absent => stats.absent += 1,
            }
        }
        Ok(stats)
    }

    fn is_own_student(&self, student_id: &str) -> bool {
        self.roster.iter().any(|s| s.id == student_id)
    }

    /// Records for roster students or marked by this teacher, newest first.
    pub async fn attendance_report(
        &self,
        query: &AttendanceQuery,
    ) -> PortResult<Vec<AttendanceRecord>> {
        let mut records: Vec<AttendanceRecord> = self
            .store
            .list_attendance(query)
            .await?
            .into_iter()
            .filter(|r| self.is_own_student(&r.student_id) || r.teacher_id == self.teacher.id)
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    /// Writes this teacher's attendance report as a PDF into `dir`.
    pub async fn export_attendance_report(
        &self,
        dir: &Path,
        query: &AttendanceQuery,
    ) -> Result<PathBuf, ClientError> {
        let records = self.attendance_report(query).await?;
        let today = report::today();
        let table = report::attendance_table(&records, query, AttendanceScope::Class, today);
        report::export_pdf(dir, &report::attendance_report_file_name(today), &table)
    }

    /// Writes the roster's marks, as currently held on the desk.
    pub fn export_marks_report(&self, dir: &Path) -> Result<PathBuf, ClientError> {
        let today = report::today();
        let table = report::marks_table(&self.teacher, &self.roster, &self.marks, today);
        report::export_pdf(dir, &report::marks_report_file_name(today), &table)
    }

    // --- Marks ---

    /// Sets one CIE component locally, clamped to the configured maximum.
    /// Call `save_marks` to persist.
    pub fn set_mark(&mut self, student_id: &str, field: MarkField, value: i64) -> PortResult<u32> {
        let marks = self.marks;
        let student = self.roster_entry_mut(student_id)?;
        let cie = student.cie.get_or_insert_with(Cie::default);
        Ok(marks.set_mark(cie, field, value))
    }

    /// Flips the assignment-submitted flag locally; returns the new value.
    pub fn toggle_assignment(&mut self, student_id: &str) -> PortResult<bool> {
        let student = self.roster_entry_mut(student_id)?;
        let cie = student.cie.get_or_insert_with(Cie::default);
        cie.assignment_submitted = !cie.assignment_submitted;
        Ok(cie.assignment_submitted)
    }

    pub async fn save_marks(&mut self, student_id: &str) -> PortResult<User> {
        let cie = self.student(student_id)?.cie.unwrap_or_default();
        let update = UserUpdate {
            cie: Some(cie),
            ..UserUpdate::default()
        };
        let updated = self.store.update_user(student_id, update).await?;
        self.replace_in_roster(updated.clone());
        Ok(updated)
    }

    fn roster_entry_mut(&mut self, student_id: &str) -> PortResult<&mut User> {
        self.roster
            .iter_mut()
            .find(|s| s.id == student_id)
            .ok_or_else(|| PortError::NotFound("Student not found.".to_string()))
    }

    // --- Notices ---

    pub async fn notices(&self) -> PortResult<Vec<Notice>> {
        self.store
            .list_notices(&NoticeQuery::for_teacher(self.teacher.id.clone()))
            .await
    }

    pub async fn post_notice(&self, draft: NoticeDraft) -> PortResult<Notice> {
        draft.validate()?;
        let notice = Notice {
            id: format!("notice-{}", Uuid::new_v4()),
            teacher_id: self.teacher.id.clone(),
            teacher_name: self.teacher.name.clone(),
            title: draft.title,
            content: draft.content,
            attachments: draft.attachments,
            timestamp: now_millis(),
        };
        self.store.create_notice(notice).await
    }

    /// Replaces title, content and attachments; the original timestamp stays.
    pub async fn edit_notice(&self, id: &str, draft: NoticeDraft) -> PortResult<Notice> {
        draft.validate()?;
        let update = NoticeUpdate {
            teacher_name: Some(self.teacher.name.clone()),
            title: Some(draft.title),
            content: Some(draft.content),
            attachments: Some(draft.attachments),
        };
        self.store.update_notice(id, update).await
    }

    pub async fn delete_notice(&self, id: &str) -> PortResult<()> {
        self.store.delete_notice(id).await
    }
}

/// Epoch millis of a `YYYY-MM-DD` date and `HH:MM` time, read as UTC.
fn manual_timestamp(date: &str, time: &str) -> PortResult<i64> {
    let date = parse_date(date)?;
    let time = NaiveTime::parse_from_str(time, TIME_FORMAT)
        .map_err(|_| PortError::Validation(format!("'{time}' is not a HH:MM time")))?;
    Ok(Utc
        .from_utc_datetime(&NaiveDateTime::new(date, time))
        .timestamp_millis())
}
