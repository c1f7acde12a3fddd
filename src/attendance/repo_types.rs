use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime, Time};
use uuid::Uuid;

use crate::users::AcmRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attendance_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        })
    }
}

/// Row of the `attendance` table.
#[derive(Debug, Clone, FromRow)]
pub struct AttendanceRecord {
    pub id: i64,
    pub user_id: Uuid,
    pub subject_id: i64,
    pub attendance_date: Date,
    pub attendance_time: Time,
    pub status: AttendanceStatus,
    pub marked_by: Option<Uuid>,
    pub qr_code_used: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Attendance row joined with its subject and student.
#[derive(Debug, Clone, FromRow)]
pub struct AttendanceEntry {
    pub id: i64,
    pub user_id: Uuid,
    pub subject_id: i64,
    pub subject_name: String,
    pub attendance_date: Date,
    pub attendance_time: Time,
    pub status: AttendanceStatus,
    pub marked_by: Option<Uuid>,
    pub qr_code_used: Option<String>,
    pub user_name: String,
    pub registration_number: Option<String>,
    pub email: String,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RecentRow {
    pub subject_name: String,
    pub attendance_date: Date,
    pub attendance_time: Time,
    pub status: AttendanceStatus,
}

/// Per-student counters computed in one grouped query.
#[derive(Debug, Clone, FromRow)]
pub struct StudentTally {
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
}
