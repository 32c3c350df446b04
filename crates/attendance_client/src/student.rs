//! crates/attendance_client/src/student.rs
//!
//! What a student sees: their attendance history and percentage, notices from
//! their teachers and their CIE marks.

use attendance_core::stats::{summary_by_subject, AttendanceSummary};
use attendance_core::{
    Attachment, AttendanceQuery, AttendanceRecord, AttendanceStatus, AttendanceStore, Cie,
    Notice, NoticeQuery, PortError, PortResult, Role, User,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Present,
    Absent,
}

impl StatusFilter {
    fn matches(&self, status: AttendanceStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Present => status == AttendanceStatus::Present,
            StatusFilter::Absent => status == AttendanceStatus::Absent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupBy {
    #[default]
    Date,
    Subject,
}

/// Records sharing a date or a subject, newest first inside the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryGroup {
    pub title: String,
    pub records: Vec<AttendanceRecord>,
}

/// How the attendance percentage should be flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
    Good,
    Warning,
    Critical,
}

impl Standing {
    pub fn for_percentage(percentage: u32) -> Self {
        if percentage >= 75 {
            Standing::Good
        } else if percentage >= 60 {
            Standing::Warning
        } else {
            Standing::Critical
        }
    }
}

pub struct StudentView {
    store: Arc<dyn AttendanceStore>,
    student: User,
    records: Vec<AttendanceRecord>,
}

impl StudentView {
    pub async fn open(store: Arc<dyn AttendanceStore>, student: User) -> PortResult<Self> {
        if student.role != Role::Student {
            return Err(PortError::Unauthorized(
                "Only students can open the student view".to_string(),
            ));
        }
        let records = store
            .list_attendance(&AttendanceQuery::for_student(student.id.clone()))
            .await?;
        Ok(Self {
            store,
            student,
            records,
        })
    }

    pub fn student(&self) -> &User {
        &self.student
    }

    pub async fn refresh(&mut self) -> PortResult<()> {
        self.records = self
            .store
            .list_attendance(&AttendanceQuery::for_student(self.student.id.clone()))
            .await?;
        Ok(())
    }

    /// All own records, newest first.
    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    /// Summary over every record, regardless of any display filter.
    pub fn summary(&self) -> AttendanceSummary {
        AttendanceSummary::from_records(&self.records)
    }

    pub fn subject_summaries(&self) -> BTreeMap<String, AttendanceSummary> {
        summary_by_subject(&self.records)
    }

    /// Filtered history grouped by date or subject. Groups are ordered
    /// descending when `descending` is set, ascending otherwise.
    pub fn history(
        &self,
        filter: StatusFilter,
        group_by: GroupBy,
        descending: bool,
    ) -> Vec<HistoryGroup> {
        let mut groups: BTreeMap<String, Vec<AttendanceRecord>> = BTreeMap::new();
        for record in self.records.iter().filter(|r| filter.matches(r.status)) {
            let key = match group_by {
                GroupBy::Date => record.date.clone(),
                GroupBy::Subject => record.subject.clone(),
            };
            groups.entry(key).or_default().push(record.clone());
        }
        let mut out: Vec<HistoryGroup> = groups
            .into_iter()
            .map(|(title, mut records)| {
                records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                HistoryGroup { title, records }
            })
            .collect();
        if descending {
            out.reverse();
        }
        out
    }

    /// Notices from the teachers this student is enrolled under.
    pub async fn notices(&self) -> PortResult<Vec<Notice>> {
        self.store
            .list_notices(&NoticeQuery::for_student(self.student.id.clone()))
            .await
    }

    pub fn marks(&self) -> Cie {
        self.student.cie.unwrap_or_default()
    }
}

/// Decodes an attachment and writes it into `dir` under its own file name.
pub fn save_attachment(dir: &Path, attachment: &Attachment) -> Result<PathBuf, ClientError> {
    let file_name = Path::new(&attachment.name)
        .file_name()
        .ok_or_else(|| {
            ClientError::Attachment(attachment.name.clone(), "missing file name".to_string())
        })?;
    // Data URLs carry a `data:<mime>;base64,` prefix before the payload.
    let payload = attachment
        .data
        .split_once("base64,")
        .map_or(attachment.data.as_str(), |(_, rest)| rest);
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ClientError::Attachment(attachment.name.clone(), e.to_string()))?;
    let path = dir.join(file_name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}
