use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{NewUser, Role, UniqueField, User, UserChange};

const USER_COLUMNS: &str = r#"
    id, full_name, email, password_hash, role, department, profile_image, phone, address,
    date_of_birth, student_id, registration_number, join_date, is_active, last_login,
    acm_member, acm_role, year, section, created_at, updated_at
"#;

pub async fn find_by_id(db: &PgPool, id: Uuid) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn find_by_email(db: &PgPool, email: &str) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
        .bind(email)
        .fetch_optional(db)
        .await
}

/// Registration number wins over student id, which wins over the primary id.
pub async fn find_by_identifier(db: &PgPool, identifier: &str) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(&format!(
        r#"
        SELECT {USER_COLUMNS}
          FROM users
         WHERE registration_number = $1 OR student_id = $1 OR id::text = $1
         ORDER BY CASE
                    WHEN registration_number = $1 THEN 0
                    WHEN student_id = $1 THEN 1
                    ELSE 2
                  END
         LIMIT 1
        "#
    ))
    .bind(identifier)
    .fetch_optional(db)
    .await
}

pub async fn list_all(db: &PgPool, role: Option<Role>) -> sqlx::Result<Vec<User>> {
    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
    if let Some(role) = role {
        qb.push(" WHERE role = ").push_bind(role);
    }
    qb.push(" ORDER BY created_at DESC");
    qb.build_query_as::<User>().fetch_all(db).await
}

pub async fn exists_with(db: &PgPool, field: UniqueField, value: &str) -> sqlx::Result<bool> {
    let sql = format!(
        "SELECT EXISTS (SELECT 1 FROM users WHERE {} = $1)",
        field.column()
    );
    sqlx::query_scalar::<_, bool>(&sql)
        .bind(value)
        .fetch_one(db)
        .await
}

pub async fn insert(db: &PgPool, u: &NewUser) -> sqlx::Result<User> {
    sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (
            id, full_name, email, password_hash, role, department, registration_number,
            student_id, acm_member, acm_role, year, section, join_date, is_active
        )
        VALUES ($1, $2, $3, $4, 'user', $5, $6, $7, $8, $9, $10, $11, $12, TRUE)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(u.id)
    .bind(&u.full_name)
    .bind(&u.email)
    .bind(&u.password_hash)
    .bind(&u.department)
    .bind(&u.registration_number)
    .bind(&u.student_id)
    .bind(u.acm_member)
    .bind(u.acm_role)
    .bind(&u.year)
    .bind(&u.section)
    .bind(u.join_date)
    .fetch_one(db)
    .await
}

/// Applies `changes` in one statement. `None` when no row has that id.
pub async fn update(db: &PgPool, id: Uuid, changes: &[UserChange]) -> sqlx::Result<Option<User>> {
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET ");
    let mut set = qb.separated(", ");
    for change in changes {
        match change {
            UserChange::FullName(v) => set.push("full_name = ").push_bind_unseparated(v.clone()),
            UserChange::Email(v) => set.push("email = ").push_bind_unseparated(v.clone()),
            UserChange::Phone(v) => set.push("phone = ").push_bind_unseparated(v.clone()),
            UserChange::Address(v) => set.push("address = ").push_bind_unseparated(v.clone()),
            UserChange::DateOfBirth(v) => {
                set.push("date_of_birth = ").push_bind_unseparated(*v)
            }
            UserChange::Department(v) => {
                set.push("department = ").push_bind_unseparated(v.clone())
            }
            UserChange::ProfileImage(v) => {
                set.push("profile_image = ").push_bind_unseparated(v.clone())
            }
            UserChange::StudentId(v) => set.push("student_id = ").push_bind_unseparated(v.clone()),
            UserChange::RegistrationNumber(v) => set
                .push("registration_number = ")
                .push_bind_unseparated(v.clone()),
            UserChange::AcmMember(v) => set.push("acm_member = ").push_bind_unseparated(*v),
            UserChange::AcmRole(v) => set.push("acm_role = ").push_bind_unseparated(*v),
            UserChange::Year(v) => set.push("year = ").push_bind_unseparated(v.clone()),
            UserChange::Section(v) => set.push("section = ").push_bind_unseparated(v.clone()),
            UserChange::Role(v) => set.push("role = ").push_bind_unseparated(*v),
            UserChange::IsActive(v) => set.push("is_active = ").push_bind_unseparated(*v),
        };
    }
    set.push("updated_at = now()");
    qb.push(" WHERE id = ").push_bind(id);
    qb.push(format!(" RETURNING {USER_COLUMNS}"));

    qb.build_query_as::<User>().fetch_optional(db).await
}

pub async fn touch_last_login(
    db: &PgPool,
    id: Uuid,
    at: OffsetDateTime,
) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET last_login = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(at)
    .fetch_optional(db)
    .await
}

/// Number of rows removed (0 or 1).
pub async fn delete(db: &PgPool, id: Uuid) -> sqlx::Result<u64> {
    let res = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected())
}

pub async fn count_active_students(db: &PgPool) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE role = 'user' AND is_active = TRUE",
    )
    .fetch_one(db)
    .await
}
