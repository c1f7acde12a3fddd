use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

pub const DEFAULT_DEPARTMENT: &str = "General";
pub const DEFAULT_CREDITS: i32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: i64,
    pub subject_name: String,
    pub subject_code: String,
    pub department: String,
    pub credits: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Name with all whitespace removed, upper-cased.
pub fn subject_code(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}
