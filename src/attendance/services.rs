use sqlx::PgPool;
use thiserror::Error;
use time::{Date, OffsetDateTime};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    dto::{RecentView, StatsView, StudentStatsView},
    repo,
    repo_types::AttendanceRecord,
};
use crate::{
    auth::AuthUser,
    error::ApiError,
    subjects::{repo as subjects, Subject},
    users::repo as users,
};

const RECENT_LIMIT: i64 = 5;

#[derive(Debug, Error)]
pub enum MarkError {
    #[error("Subject is required")]
    EmptySubject,
    #[error("User not found")]
    UserNotFound,
    #[error("Attendance already marked for today")]
    AlreadyMarked,
    #[error("markedBy does not reference a user")]
    UnknownMarker,
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

const MARKED_BY_FKEY: &str = "attendance_marked_by_fkey";

impl From<sqlx::Error> for MarkError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_foreign_key_violation() && db_err.constraint() == Some(MARKED_BY_FKEY) {
                return MarkError::UnknownMarker;
            }
        }
        MarkError::Database(e)
    }
}

impl From<MarkError> for ApiError {
    fn from(e: MarkError) -> Self {
        match e {
            MarkError::EmptySubject | MarkError::UnknownMarker => {
                ApiError::BadRequest(e.to_string())
            }
            MarkError::UserNotFound => ApiError::NotFound(e.to_string()),
            MarkError::AlreadyMarked => ApiError::Conflict(e.to_string()),
            MarkError::Database(inner) => ApiError::from(inner),
        }
    }
}

/// Admins may record someone else as the marker; everyone else marks as themselves.
pub fn resolve_marker(caller: &AuthUser, requested: Option<Uuid>) -> Uuid {
    match requested {
        Some(by) if caller.is_admin() => by,
        _ => caller.user_id,
    }
}

/// Records `user_id` as present for `subject_name` on the campus day of `now`.
/// A second mark for the same subject and day is refused by the UNIQUE constraint.
pub async fn mark_attendance(
    db: &PgPool,
    user_id: Uuid,
    subject_name: &str,
    marked_by: Option<Uuid>,
    qr_code: Option<&str>,
    now: OffsetDateTime,
) -> Result<(AttendanceRecord, Subject), MarkError> {
    let subject_name = subject_name.trim();
    if subject_name.is_empty() {
        return Err(MarkError::EmptySubject);
    }

    if users::find_by_id(db, user_id).await?.is_none() {
        warn!(%user_id, "mark for unknown user");
        return Err(MarkError::UserNotFound);
    }
    if let Some(by) = marked_by.filter(|by| *by != user_id) {
        if users::find_by_id(db, by).await?.is_none() {
            warn!(%user_id, marked_by = %by, "mark with unknown marker");
            return Err(MarkError::UnknownMarker);
        }
    }

    let subject = subjects::find_or_create(db, subject_name).await?;
    let time = now.time().replace_nanosecond(0).unwrap_or(now.time());

    let record = repo::insert_once(db, user_id, subject.id, now.date(), time, marked_by, qr_code)
        .await
        .map_err(|e| {
            error!(error = %e, %user_id, subject_id = subject.id, "attendance insert failed");
            e
        })?
        .ok_or(MarkError::AlreadyMarked)?;

    info!(
        attendance_id = record.id,
        %user_id,
        subject = %subject.subject_name,
        marked_by = ?marked_by,
        "attendance marked"
    );
    Ok((record, subject))
}

pub async fn delete_attendance(db: &PgPool, attendance_id: i64) -> Result<(), ApiError> {
    if repo::delete(db, attendance_id).await? == 0 {
        return Err(ApiError::not_found(
            "Attendance record not found or already deleted.",
        ));
    }
    info!(attendance_id, "attendance deleted");
    Ok(())
}

/// Rounded share of attended classes; 0 when there is nothing to attend.
pub fn percentage(attended: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    (attended as f64 / total as f64 * 100.0).round() as i64
}

pub async fn attendance_stats(db: &PgPool, user_id: Uuid) -> Result<StatsView, ApiError> {
    let user = users::find_by_id(db, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let total_classes = subjects::count_by_department(db, &user.department).await?;
    let attended_classes = repo::count_present(db, user_id).await?;
    let recent_attendance = repo::recent(db, user_id, RECENT_LIMIT)
        .await?
        .into_iter()
        .map(RecentView::from)
        .collect();

    Ok(StatsView {
        total_classes,
        attended_classes,
        percentage: percentage(attended_classes, total_classes),
        recent_attendance,
    })
}

pub async fn all_attendance_stats(db: &PgPool) -> Result<Vec<StudentStatsView>, ApiError> {
    Ok(repo::tally_students(db)
        .await?
        .into_iter()
        .map(StudentStatsView::from)
        .collect())
}

pub async fn today_count(db: &PgPool, today: Date) -> Result<i64, ApiError> {
    Ok(repo::count_on(db, today).await?)
}
