use sqlx::PgPool;
use time::{Date, Time};
use uuid::Uuid;

use super::repo_types::{AttendanceEntry, AttendanceRecord, RecentRow, StudentTally};

const ENTRY_SELECT: &str = r#"
    SELECT a.id, a.user_id, a.subject_id, s.subject_name, a.attendance_date, a.attendance_time,
           a.status, a.marked_by, a.qr_code_used, u.full_name AS user_name,
           u.registration_number, u.email, u.profile_image
      FROM attendance a
      JOIN subjects s ON a.subject_id = s.id
      JOIN users u ON a.user_id = u.id
"#;

/// `None` when the student already has a record for this subject on `date`.
pub async fn insert_once(
    db: &PgPool,
    user_id: Uuid,
    subject_id: i64,
    date: Date,
    time: Time,
    marked_by: Option<Uuid>,
    qr_code: Option<&str>,
) -> sqlx::Result<Option<AttendanceRecord>> {
    sqlx::query_as::<_, AttendanceRecord>(
        r#"
        INSERT INTO attendance
            (user_id, subject_id, attendance_date, attendance_time, status, marked_by, qr_code_used)
        VALUES ($1, $2, $3, $4, 'present', $5, $6)
        ON CONFLICT (user_id, subject_id, attendance_date) DO NOTHING
        RETURNING id, user_id, subject_id, attendance_date, attendance_time, status,
                  marked_by, qr_code_used, created_at
        "#,
    )
    .bind(user_id)
    .bind(subject_id)
    .bind(date)
    .bind(time)
    .bind(marked_by)
    .bind(qr_code)
    .fetch_optional(db)
    .await
}

pub async fn delete(db: &PgPool, id: i64) -> sqlx::Result<u64> {
    let res = sqlx::query("DELETE FROM attendance WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected())
}

pub async fn list_by_user(db: &PgPool, user_id: Uuid) -> sqlx::Result<Vec<AttendanceEntry>> {
    sqlx::query_as::<_, AttendanceEntry>(&format!(
        "{ENTRY_SELECT} WHERE a.user_id = $1 ORDER BY a.attendance_date DESC, a.attendance_time DESC"
    ))
    .bind(user_id)
    .fetch_all(db)
    .await
}

pub async fn list_by_date(db: &PgPool, date: Date) -> sqlx::Result<Vec<AttendanceEntry>> {
    sqlx::query_as::<_, AttendanceEntry>(&format!(
        "{ENTRY_SELECT} WHERE a.attendance_date = $1 ORDER BY a.attendance_time DESC, a.id DESC"
    ))
    .bind(date)
    .fetch_all(db)
    .await
}

pub async fn count_on(db: &PgPool, date: Date) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM attendance WHERE attendance_date = $1")
        .bind(date)
        .fetch_one(db)
        .await
}

pub async fn count_present(db: &PgPool, user_id: Uuid) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM attendance WHERE user_id = $1 AND status = 'present'",
    )
    .bind(user_id)
    .fetch_one(db)
    .await
}

pub async fn recent(db: &PgPool, user_id: Uuid, limit: i64) -> sqlx::Result<Vec<RecentRow>> {
    sqlx::query_as::<_, RecentRow>(
        r#"
        SELECT s.subject_name, a.attendance_date, a.attendance_time, a.status
          FROM attendance a
          JOIN subjects s ON a.subject_id = s.id
         WHERE a.user_id = $1
         ORDER BY a.attendance_date DESC, a.attendance_time DESC
         LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(db)
    .await
}

/// Every `user`-role account with its department subject count and present count.
pub async fn tally_students(db: &PgPool) -> sqlx::Result<Vec<StudentTally>> {
    sqlx::query_as::<_, StudentTally>(
        r#"
        SELECT u.id AS user_id, u.full_name, u.email, u.registration_number, u.department,
               u.acm_member, u.acm_role, u.year, u.section,
               COALESCE(s.total, 0) AS total_classes,
               COALESCE(a.attended, 0) AS attended_classes
          FROM users u
          LEFT JOIN (SELECT department, COUNT(*) AS total FROM subjects GROUP BY department) s
                 ON s.department = u.department
          LEFT JOIN (SELECT user_id, COUNT(*) AS attended FROM attendance
                      WHERE status = 'present' GROUP BY user_id) a
                 ON a.user_id = u.id
         WHERE u.role = 'user'
         ORDER BY u.full_name
        "#,
    )
    .fetch_all(db)
    .await
}
