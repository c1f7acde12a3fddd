use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Admin => "admin",
            Role::User => "user",
        })
    }
}

/// ACM chapter positions, declared in report order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "acm_role")]
pub enum AcmRole {
    President,
    #[sqlx(rename = "Vice President")]
    #[serde(rename = "Vice President")]
    VicePresident,
    Secretary,
    #[sqlx(rename = "Joint Secretary")]
    #[serde(rename = "Joint Secretary")]
    JointSecretary,
    Treasurer,
    #[sqlx(rename = "Technical Lead")]
    #[serde(rename = "Technical Lead")]
    TechnicalLead,
    #[sqlx(rename = "Design Lead")]
    #[serde(rename = "Design Lead")]
    DesignLead,
    #[sqlx(rename = "Event Coordinator")]
    #[serde(rename = "Event Coordinator")]
    EventCoordinator,
    #[sqlx(rename = "Public Relations")]
    #[serde(rename = "Public Relations")]
    PublicRelations,
    Member,
}

impl AcmRole {
    pub const ALL: [AcmRole; 10] = [
        AcmRole::President,
        AcmRole::VicePresident,
        AcmRole::Secretary,
        AcmRole::JointSecretary,
        AcmRole::Treasurer,
        AcmRole::TechnicalLead,
        AcmRole::DesignLead,
        AcmRole::EventCoordinator,
        AcmRole::PublicRelations,
        AcmRole::Member,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AcmRole::President => "President",
            AcmRole::VicePresident => "Vice President",
            AcmRole::Secretary => "Secretary",
            AcmRole::JointSecretary => "Joint Secretary",
            AcmRole::Treasurer => "Treasurer",
            AcmRole::TechnicalLead => "Technical Lead",
            AcmRole::DesignLead => "Design Lead",
            AcmRole::EventCoordinator => "Event Coordinator",
            AcmRole::PublicRelations => "Public Relations",
            AcmRole::Member => "Member",
        }
    }

    /// Case-insensitive match on the display label.
    pub fn parse(raw: &str) -> Option<AcmRole> {
        let wanted = raw.trim();
        AcmRole::ALL
            .into_iter()
            .find(|r| r.label().eq_ignore_ascii_case(wanted))
    }
}

/// Row of the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub department: String,
    pub profile_image: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<Date>,
    pub student_id: Option<String>,
    pub registration_number: Option<String>,
    pub join_date: OffsetDateTime,
    pub is_active: bool,
    pub last_login: Option<OffsetDateTime>,
    pub acm_member: bool,
    pub acm_role: Option<AcmRole>,
    pub year: Option<String>,
    pub section: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    /// Text encoded in the student's QR code.
    pub fn qr_payload(&self) -> String {
        self.registration_number
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Validated input for a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub department: String,
    pub registration_number: String,
    pub student_id: Option<String>,
    pub acm_member: bool,
    pub acm_role: Option<AcmRole>,
    pub year: Option<String>,
    pub section: Option<String>,
    pub join_date: OffsetDateTime,
}

/// One column assignment of a partial update.
#[derive(Debug, Clone, PartialEq)]
pub enum UserChange {
    FullName(String),
    Email(String),
    Phone(Option<String>),
    Address(Option<String>),
    DateOfBirth(Option<Date>),
    Department(String),
    ProfileImage(Option<String>),
    StudentId(Option<String>),
    RegistrationNumber(Option<String>),
    AcmMember(bool),
    AcmRole(Option<AcmRole>),
    Year(Option<String>),
    Section(Option<String>),
    Role(Role),
    IsActive(bool),
}

/// Columns guarded by a UNIQUE constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    RegistrationNumber,
    StudentId,
}

impl UniqueField {
    pub fn column(self) -> &'static str {
        match self {
            UniqueField::Email => "email",
            UniqueField::RegistrationNumber => "registration_number",
            UniqueField::StudentId => "student_id",
        }
    }

    pub fn from_constraint(name: &str) -> Option<UniqueField> {
        match name {
            "users_email_key" => Some(UniqueField::Email),
            "users_registration_number_key" => Some(UniqueField::RegistrationNumber),
            "users_student_id_key" => Some(UniqueField::StudentId),
            _ => None,
        }
    }

    pub fn conflict_message(self) -> &'static str {
        match self {
            UniqueField::Email => "A user with this email already exists.",
            UniqueField::RegistrationNumber => {
                "A user with this registration number already exists."
            }
            UniqueField::StudentId => "A user with this student ID already exists.",
        }
    }
}
