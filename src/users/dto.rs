use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{AcmRole, Role, User};
use crate::format::date_string;

/// Accepts camelCase and snake_case spellings of every multi-word field.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default, alias = "full_name")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default, alias = "registration_number")]
    pub registration_number: Option<String>,
    #[serde(default, alias = "acm_member", deserialize_with = "boolish")]
    pub acm_member: Option<bool>,
    #[serde(default, alias = "acm_role")]
    pub acm_role: Option<String>,
    #[serde(default, deserialize_with = "stringish")]
    pub year: Option<String>,
    #[serde(default, deserialize_with = "stringish")]
    pub section: Option<String>,
    #[serde(default, alias = "student_id", deserialize_with = "stringish")]
    pub student_id: Option<String>,
}

/// Partial profile update. Outer `None` means "not sent", `Some(None)` means explicit null.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(default, alias = "full_name", deserialize_with = "present")]
    pub full_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub address: Option<Option<String>>,
    #[serde(default, alias = "date_of_birth", deserialize_with = "present")]
    pub date_of_birth: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub department: Option<Option<String>>,
    #[serde(default, alias = "profile_image", deserialize_with = "present")]
    pub profile_image: Option<Option<String>>,
    #[serde(default, alias = "student_id", deserialize_with = "present")]
    pub student_id: Option<Option<String>>,
    #[serde(default, alias = "registration_number", deserialize_with = "present")]
    pub registration_number: Option<Option<String>>,
    #[serde(default, alias = "acm_member", deserialize_with = "boolish")]
    pub acm_member: Option<bool>,
    #[serde(default, alias = "acm_role", deserialize_with = "present")]
    pub acm_role: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub year: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub section: Option<Option<String>>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default, alias = "is_active", deserialize_with = "boolish")]
    pub is_active: Option<bool>,
}

fn present<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrText {
    Bool(bool),
    Text(String),
}

/// `true`, `"true"`, `1`-style text and `null` are all accepted for flags.
fn boolish<'de, D: Deserializer<'de>>(de: D) -> Result<Option<bool>, D::Error> {
    match Option::<BoolOrText>::deserialize(de)? {
        None => Ok(None),
        Some(BoolOrText::Bool(b)) => Ok(Some(b)),
        Some(BoolOrText::Text(t)) => match t.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            "" => Ok(None),
            other => Err(serde::de::Error::custom(format!("invalid boolean: {other}"))),
        },
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(i64),
}

/// Years and sections arrive as either numbers or strings from different forms.
fn stringish<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<TextOrNumber>::deserialize(de)?.map(|v| match v {
        TextOrNumber::Text(t) => t,
        TextOrNumber::Number(n) => n.to_string(),
    }))
}

/// Full profile as returned to clients. The password hash never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub department: String,
    pub profile_image: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<String>,
    pub student_id: Option<String>,
    pub registration_number: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub join_date: OffsetDateTime,
    pub is_active: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    pub acm_member: bool,
    pub acm_role: Option<AcmRole>,
    pub year: Option<String>,
    pub section: Option<String>,
    pub qr_payload: String,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            full_name: u.full_name.clone(),
            email: u.email.clone(),
            role: u.role,
            department: u.department.clone(),
            profile_image: u.profile_image.clone(),
            phone: u.phone.clone(),
            address: u.address.clone(),
            date_of_birth: u.date_of_birth.map(date_string),
            student_id: u.student_id.clone(),
            registration_number: u.registration_number.clone(),
            join_date: u.join_date,
            is_active: u.is_active,
            last_login: u.last_login,
            acm_member: u.acm_member,
            acm_role: u.acm_role,
            year: u.year.clone(),
            section: u.section.clone(),
            qr_payload: u.qr_payload(),
        }
    }
}

/// What the scanner needs to confirm a scanned code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupView {
    pub id: Uuid,
    pub name: String,
    pub registration_number: Option<String>,
    pub department: String,
    pub avatar: Option<String>,
}
