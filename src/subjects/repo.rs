use sqlx::PgPool;

use super::repo_types::{subject_code, Subject, DEFAULT_CREDITS, DEFAULT_DEPARTMENT};

/// Returns the subject called `name`, creating it on first use.
/// Concurrent first uses converge on the single row the UNIQUE name allows.
pub async fn find_or_create(db: &PgPool, name: &str) -> sqlx::Result<Subject> {
    let inserted = sqlx::query_as::<_, Subject>(
        r#"
        INSERT INTO subjects (subject_name, subject_code, department, credits)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (subject_name) DO NOTHING
        RETURNING id, subject_name, subject_code, department, credits, created_at
        "#,
    )
    .bind(name)
    .bind(subject_code(name))
    .bind(DEFAULT_DEPARTMENT)
    .bind(DEFAULT_CREDITS)
    .fetch_optional(db)
    .await?;

    match inserted {
        Some(subject) => Ok(subject),
        None => {
            sqlx::query_as::<_, Subject>(
                r#"
                SELECT id, subject_name, subject_code, department, credits, created_at
                FROM subjects
                WHERE subject_name = $1
                "#,
            )
            .bind(name)
            .fetch_one(db)
            .await
        }
    }
}

pub async fn list_all(db: &PgPool) -> sqlx::Result<Vec<Subject>> {
    sqlx::query_as::<_, Subject>(
        r#"
        SELECT id, subject_name, subject_code, department, credits, created_at
        FROM subjects
        ORDER BY subject_name
        "#,
    )
    .fetch_all(db)
    .await
}

pub async fn count_by_department(db: &PgPool, department: &str) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM subjects WHERE department = $1")
        .bind(department)
        .fetch_one(db)
        .await
}
