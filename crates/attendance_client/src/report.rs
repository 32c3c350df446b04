//! crates/attendance_client/src/report.rs
//!
//! PDF exports: attendance reports, the student marks sheet and the user and
//! student directories. Each export is first built as a `ReportTable` and
//! then laid out on A4 pages with the built-in Helvetica fonts.

use attendance_core::stats::MarksConfig;
use attendance_core::{AttendanceQuery, AttendanceRecord, Role, User};
use chrono::{NaiveDate, TimeZone, Utc};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::admin::UserFilter;
use crate::error::ClientError;

pub const ATTENDANCE_HEADERS: [&str; 5] = ["Date", "Student", "Subject", "Status", "Time"];
pub const MARKS_HEADERS: [&str; 7] = ["Name", "ID", "Email", "CIE 1", "CIE 2", "Asgn", "Status"];
pub const USER_DIRECTORY_HEADERS: [&str; 4] = ["ID", "Full Name", "Email", "Role"];
pub const STUDENT_DIRECTORY_HEADERS: [&str; 3] = ["ID", "Name", "Email"];

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 14.0;
const TITLE_SIZE: f32 = 20.0;
const TEXT_SIZE: f32 = 10.0;
const CELL_SIZE: f32 = 9.0;
const LINE_STEP: f32 = 5.0;
const ROW_STEP: f32 = 7.0;
/// Baseline of the first line under the title.
const FIRST_LINE_Y: f32 = PAGE_HEIGHT - 30.0;
/// Average Helvetica glyph width as a fraction of the font size.
const GLYPH_WIDTH: f32 = 0.5;
const PT_TO_MM: f32 = 0.3528;

/// A titled table ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTable {
    pub title: String,
    /// Text lines printed between the title and the table.
    pub lines: Vec<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReportTable {
    fn new(title: &str, generated_on: NaiveDate, headers: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            lines: vec![format!("Generated on: {}", generated_on.format("%Y-%m-%d"))],
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    fn line(mut self, line: String) -> Self {
        self.lines.push(line);
        self
    }
}

/// Whose attendance report is being printed. The two dashboards label
/// their filters differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceScope {
    School,
    Class,
}

fn dated_name(prefix: &str, generated_on: NaiveDate) -> String {
    format!("{}_{}.pdf", prefix, generated_on.format("%Y-%m-%d"))
}

pub fn attendance_report_file_name(generated_on: NaiveDate) -> String {
    dated_name("attendance_report", generated_on)
}

pub fn marks_report_file_name(generated_on: NaiveDate) -> String {
    dated_name("student_marks", generated_on)
}

pub fn user_directory_file_name(generated_on: NaiveDate) -> String {
    dated_name("user_directory", generated_on)
}

pub fn student_directory_file_name(generated_on: NaiveDate) -> String {
    dated_name("all_students", generated_on)
}

/// `HH:MM:SS` (UTC) of an epoch-millis timestamp; empty when out of range.
fn time_of_day(timestamp: i64) -> String {
    Utc.timestamp_millis_opt(timestamp)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_default()
}

pub fn attendance_table(
    records: &[AttendanceRecord],
    query: &AttendanceQuery,
    scope: AttendanceScope,
    generated_on: NaiveDate,
) -> ReportTable {
    let subject = query.subject.as_deref().unwrap_or("All");
    let start = query.start_date.as_deref().unwrap_or("Start");
    let end = query.end_date.as_deref().unwrap_or("Now");
    let table = ReportTable::new("Attendance Report", generated_on, &ATTENDANCE_HEADERS);
    let mut table = match scope {
        AttendanceScope::School => {
            table.line(format!("Filters: {} | {} to {}", subject, start, end))
        }
        AttendanceScope::Class => table
            .line(format!("Period: {} to {}", start, end))
            .line(format!("Subject: {}", subject)),
    };
    table.rows = records
        .iter()
        .map(|r| {
            vec![
                r.date.clone(),
                r.student_name.clone(),
                r.subject.clone(),
                r.status.as_str().to_string(),
                time_of_day(r.timestamp),
            ]
        })
        .collect();
    table
}

/// One row per student. Students without marks print zeros.
pub fn marks_table(
    teacher: &User,
    students: &[User],
    marks: &MarksConfig,
    generated_on: NaiveDate,
) -> ReportTable {
    let mut table = ReportTable::new("Student Marks Report", generated_on, &MARKS_HEADERS)
        .line(format!("Teacher: {}", teacher.name))
        .line(format!("Configuration: {}", marks_configuration_note(marks)));
    table.rows = students
        .iter()
        .map(|s| {
            let cie = s.cie.unwrap_or_default();
            let status = if cie.assignment_submitted {
                "Submitted"
            } else {
                "Pending"
            };
            vec![
                s.name.clone(),
                s.id.clone(),
                s.email.clone(),
                cie.cie1.to_string(),
                cie.cie2.to_string(),
                cie.assignment.to_string(),
                status.to_string(),
            ]
        })
        .collect();
    table
}

/// The filtered user list without administrators.
pub fn user_directory_table(
    users: &[User],
    filter: &UserFilter,
    generated_on: NaiveDate,
) -> ReportTable {
    let mut subtitle = match filter.role {
        Some(Role::Student) => "Student List",
        Some(Role::Teacher) => "Teacher List",
        _ => "All Users",
    }
    .to_string();
    let search = filter.search.trim();
    if !search.is_empty() {
        subtitle.push_str(&format!(" (Filtered: \"{}\")", search));
    }
    let mut table =
        ReportTable::new("User Directory", generated_on, &USER_DIRECTORY_HEADERS).line(subtitle);
    table.rows = filter
        .apply(users)
        .into_iter()
        .filter(|u| u.role != Role::Admin)
        .map(|u| vec![u.id, u.name, u.email, u.role.as_str().to_string()])
        .collect();
    table
}

pub fn student_directory_table(users: &[User], generated_on: NaiveDate) -> ReportTable {
    let students: Vec<&User> = users.iter().filter(|u| u.role == Role::Student).collect();
    let mut table = ReportTable::new("Student Directory", generated_on, &STUDENT_DIRECTORY_HEADERS)
        .line(format!("Total Students: {}", students.len()));
    table.rows = students
        .into_iter()
        .map(|u| vec![u.id.clone(), u.name.clone(), u.email.clone()])
        .collect();
    table
}

/// Limits line shown under the marks report title.
pub fn marks_configuration_note(marks: &MarksConfig) -> String {
    format!(
        "CIE 1 (Max {}), CIE 2 (Max {}), Assignment (Max {})",
        marks.max_cie1, marks.max_cie2, marks.max_assignment
    )
}

/// Splits `rows` into per-page ranges. The first page holds `first` rows,
/// every later page `rest`.
fn paginate(rows: usize, first: usize, rest: usize) -> Vec<Range<usize>> {
    let first = first.max(1);
    let rest = rest.max(1);
    let mut pages = vec![0..rows.min(first)];
    let mut start = first;
    while start < rows {
        let end = (start + rest).min(rows);
        pages.push(start..end);
        start = end;
    }
    pages
}

/// Shortens `cell` to `max_chars`, ending in `...` when cut.
fn fit(cell: &str, max_chars: usize) -> String {
    if cell.chars().count() <= max_chars {
        return cell.to_string();
    }
    let kept: String = cell.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn rows_between(top: f32) -> usize {
    ((top - MARGIN) / ROW_STEP).floor().max(1.0) as usize
}

fn pdf_error(e: impl std::fmt::Display) -> ClientError {
    ClientError::Pdf(e.to_string())
}

fn draw_row(layer: &PdfLayerReference, cells: &[String], y: f32, font: &IndirectFontRef) {
    let columns = cells.len().max(1) as f32;
    let width = (PAGE_WIDTH - 2.0 * MARGIN) / columns;
    let max_chars = (width / (CELL_SIZE * GLYPH_WIDTH * PT_TO_MM)).floor() as usize;
    for (i, cell) in cells.iter().enumerate() {
        let x = MARGIN + i as f32 * width;
        layer.use_text(fit(cell, max_chars), CELL_SIZE, Mm(x), Mm(y), font);
    }
}

/// Lays the table out on as many A4 pages as it needs. The header row is
/// repeated on every page.
pub fn render_pdf(table: &ReportTable) -> Result<Vec<u8>, ClientError> {
    let (doc, page, layer) =
        PdfDocument::new(&table.title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_error)?;

    let first_layer = doc.get_page(page).get_layer(layer);
    first_layer.use_text(
        table.title.as_str(),
        TITLE_SIZE,
        Mm(MARGIN),
        Mm(PAGE_HEIGHT - 20.0),
        &bold,
    );
    let mut y = FIRST_LINE_Y;
    for line in &table.lines {
        first_layer.use_text(line.as_str(), TEXT_SIZE, Mm(MARGIN), Mm(y), &regular);
        y -= LINE_STEP;
    }
    let first_header_y = y - LINE_STEP;
    let later_header_y = PAGE_HEIGHT - MARGIN - ROW_STEP;

    let pages = paginate(
        table.rows.len(),
        rows_between(first_header_y - ROW_STEP),
        rows_between(later_header_y - ROW_STEP),
    );
    for (n, range) in pages.into_iter().enumerate() {
        let (current, header_y) = if n == 0 {
            (doc.get_page(page).get_layer(layer), first_header_y)
        } else {
            let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            (doc.get_page(page).get_layer(layer), later_header_y)
        };
        draw_row(&current, &table.headers, header_y, &bold);
        let mut row_y = header_y - ROW_STEP;
        for row in &table.rows[range] {
            draw_row(&current, row, row_y, &regular);
            row_y -= ROW_STEP;
        }
    }

    doc.save_to_bytes().map_err(pdf_error)
}

/// Renders `table` into `dir/file_name` and returns the path.
pub fn export_pdf(dir: &Path, file_name: &str, table: &ReportTable) -> Result<PathBuf, ClientError> {
    let path = dir.join(file_name);
    std::fs::write(&path, render_pdf(table)?)?;
    info!("Exported {} ({} rows) to {}", table.title, table.rows.len(), path.display());
    Ok(path)
}

/// Today's date, used for the "Generated on" line and file names.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
