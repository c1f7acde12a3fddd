use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{AttendanceEntry, AttendanceRecord, AttendanceStatus, RecentRow, StudentTally};
use crate::{
    format::{date_string, time_string},
    users::AcmRole,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRequest {
    #[serde(default, alias = "user_id")]
    pub user_id: Option<Uuid>,
    #[serde(default, alias = "subject_name", alias = "subjectName")]
    pub subject: String,
    #[serde(default, alias = "marked_by")]
    pub marked_by: Option<Uuid>,
    #[serde(default, alias = "qr_code", alias = "qrCodeUsed")]
    pub qr_code: Option<String>,
}

/// A freshly written record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkedView {
    pub id: i64,
    pub user_id: Uuid,
    pub subject_id: i64,
    pub subject: String,
    pub date: String,
    pub time: String,
    pub status: AttendanceStatus,
    pub marked_by: Option<Uuid>,
}

impl MarkedView {
    pub fn new(record: &AttendanceRecord, subject: &str) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            subject_id: record.subject_id,
            subject: subject.to_string(),
            date: date_string(record.attendance_date),
            time: time_string(record.attendance_time),
            status: record.status,
            marked_by: record.marked_by,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    pub id: i64,
    pub user_id: Uuid,
    pub subject_id: i64,
    pub subject: String,
    pub date: String,
    pub time: String,
    pub status: AttendanceStatus,
    pub marked_by: Option<Uuid>,
    pub qr_code_used: Option<String>,
    pub user_name: String,
    pub registration_number: Option<String>,
    pub email: String,
    pub profile_image: Option<String>,
}

impl From<AttendanceEntry> for EntryView {
    fn from(e: AttendanceEntry) -> Self {
        Self {
            id: e.id,
            user_id: e.user_id,
            subject_id: e.subject_id,
            subject: e.subject_name,
            date: date_string(e.attendance_date),
            time: time_string(e.attendance_time),
            status: e.status,
            marked_by: e.marked_by,
            qr_code_used: e.qr_code_used,
            user_name: e.user_name,
            registration_number: e.registration_number,
            email: e.email,
            profile_image: e.profile_image,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentView {
    pub subject: String,
    pub date: String,
    pub time: String,
    pub status: AttendanceStatus,
}

impl From<RecentRow> for RecentView {
    fn from(r: RecentRow) -> Self {
        Self {
            subject: r.subject_name,
            date: date_string(r.attendance_date),
            time: time_string(r.attendance_time),
            status: r.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub total_classes: i64,
    pub attended_classes: i64,
    pub percentage: i64,
    pub recent_attendance: Vec<RecentView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStatsView {
    pub user_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub registration_number: Option<String>,
    pub department: String,
    pub acm_member: bool,
    pub acm_role: Option<AcmRole>,
    pub year: Option<String>,
    pub section: Option<String>,
    pub total_classes: i64,
    pub attended_classes: i64,
    pub percentage: i64,
}

impl From<StudentTally> for StudentStatsView {
    fn from(t: StudentTally) -> Self {
        Self {
            percentage: super::services::percentage(t.attended_classes, t.total_classes),
            user_id: t.user_id,
            full_name: t.full_name,
            email: t.email,
            registration_number: t.registration_number,
            department: t.department,
            acm_member: t.acm_member,
            acm_role: t.acm_role,
            year: t.year,
            section: t.section,
            total_classes: t.total_classes,
            attended_classes: t.attended_classes,
        }
    }
}
