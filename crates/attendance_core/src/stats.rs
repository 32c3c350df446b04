//! crates/attendance_core/src/stats.rs
//!
//! Derived figures shown on the dashboards: attendance percentages, CIE mark
//! limits and generated teacher identifiers.

use std::collections::BTreeMap;

use crate::domain::{AttendanceRecord, AttendanceStatus, Cie, Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttendanceSummary {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    /// Present share of all classes, rounded half up. Zero when there are no classes.
    pub percentage: u32,
}

impl AttendanceSummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AttendanceRecord>) -> Self {
        let mut summary = Self::default();
        for record in records {
            summary.total += 1;
            match record.status {
                AttendanceStatus::Present => summary.present += 1,
                AttendanceStatus::Absent => summary.absent += 1,
            }
        }
        summary.percentage = rounded_percentage(summary.present, summary.total);
        summary
    }
}

fn rounded_percentage(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part * 200 + whole) / (whole * 2)) as u32
}

/// One summary per subject, ordered by subject name.
pub fn summary_by_subject(records: &[AttendanceRecord]) -> BTreeMap<String, AttendanceSummary> {
    let mut grouped: BTreeMap<String, Vec<&AttendanceRecord>> = BTreeMap::new();
    for record in records {
        grouped.entry(record.subject.clone()).or_default().push(record);
    }
    grouped
        .into_iter()
        .map(|(subject, records)| (subject, AttendanceSummary::from_records(records)))
        .collect()
}

/// Which CIE component a mark edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkField {
    Cie1,
    Cie2,
    Assignment,
}

/// Maximum marks per CIE component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarksConfig {
    pub max_cie1: u32,
    pub max_cie2: u32,
    pub max_assignment: u32,
}

impl Default for MarksConfig {
    fn default() -> Self {
        Self {
            max_cie1: 20,
            max_cie2: 20,
            max_assignment: 10,
        }
    }
}

impl MarksConfig {
    pub fn max_for(&self, field: MarkField) -> u32 {
        match field {
            MarkField::Cie1 => self.max_cie1,
            MarkField::Cie2 => self.max_cie2,
            MarkField::Assignment => self.max_assignment,
        }
    }

    /// Writes `value` into `cie`, clamped to `[0, max]`; returns the stored value.
    pub fn set_mark(&self, cie: &mut Cie, field: MarkField, value: i64) -> u32 {
        let clamped = value.clamp(0, i64::from(self.max_for(field))) as u32;
        match field {
            MarkField::Cie1 => cie.cie1 = clamped,
            MarkField::Cie2 => cie.cie2 = clamped,
            MarkField::Assignment => cie.assignment = clamped,
        }
        clamped
    }
}

/// Next `TC<n>` identifier: one past the largest numeric `TC` teacher id.
pub fn next_teacher_id(users: &[User]) -> String {
    let max = users
        .iter()
        .filter(|u| u.role == Role::Teacher)
        .filter_map(|u| u.id.strip_prefix("TC"))
        .map(|n| n.parse::<u64>().unwrap_or(0))
        .max()
        .unwrap_or(0);
    format!("TC{}", max.saturating_add(1))
}
