use base64ct::{Base64, Encoding};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{RegisterRequest, UpdateUserRequest},
    repo,
    repo_types::{AcmRole, NewUser, UniqueField, User, UserChange},
};
use crate::{
    auth::{
        services::{
            email_domain_allowed, hash_password, is_valid_email, normalize_email,
            MIN_PASSWORD_LEN,
        },
        AuthUser,
    },
    error::ApiError,
    format::parse_date,
    state::AppState,
    storage::ImageUpload,
};

#[derive(Debug, Error)]
pub enum UserError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("{0}")]
    Invalid(String),
    #[error("{}", .0.conflict_message())]
    Duplicate(UniqueField),
    #[error("User not found")]
    NotFound,
    #[error("No valid fields to update")]
    NoChanges,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for UserError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                if let Some(field) = db_err.constraint().and_then(UniqueField::from_constraint) {
                    return UserError::Duplicate(field);
                }
            }
        }
        UserError::Internal(anyhow::Error::new(e).context("users query"))
    }
}

impl From<UserError> for ApiError {
    fn from(e: UserError) -> Self {
        match e {
            UserError::MissingFields(_) | UserError::Invalid(_) | UserError::NoChanges => {
                ApiError::BadRequest(e.to_string())
            }
            UserError::Duplicate(_) => ApiError::Conflict(e.to_string()),
            UserError::NotFound => ApiError::NotFound(e.to_string()),
            UserError::Internal(inner) => ApiError::Internal(inner),
        }
    }
}

/// Admins create accounts with the core fields; students registering themselves
/// must also fill in their ACM, year, section and student id details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationMode {
    Admin,
    SelfServe,
}

fn filled(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Checks shape and completeness; everything that needs the database comes later.
pub fn validate_registration(
    req: &RegisterRequest,
    mode: RegistrationMode,
    allowed_domains: &[String],
) -> Result<ValidRegistration, UserError> {
    let full_name = filled(&req.full_name);
    let email = filled(&req.email).map(|e| normalize_email(&e));
    let password = req.password.clone().filter(|p| !p.trim().is_empty());
    let department = filled(&req.department);
    let registration_number = filled(&req.registration_number);
    let year = filled(&req.year);
    let section = filled(&req.section);
    let student_id = filled(&req.student_id);

    let mut missing = Vec::new();
    if full_name.is_none() {
        missing.push("fullName");
    }
    if email.is_none() {
        missing.push("email");
    }
    if password.is_none() {
        missing.push("password");
    }
    if department.is_none() {
        missing.push("department");
    }
    if registration_number.is_none() {
        missing.push("registrationNumber");
    }
    if mode == RegistrationMode::SelfServe {
        if req.acm_member.is_none() {
            missing.push("acmMember");
        }
        if year.is_none() {
            missing.push("year");
        }
        if section.is_none() {
            missing.push("section");
        }
        if student_id.is_none() {
            missing.push("studentId");
        }
    }

    let (
        Some(full_name),
        Some(email),
        Some(password),
        Some(department),
        Some(registration_number),
        true,
    ) = (
        full_name,
        email,
        password,
        department,
        registration_number,
        missing.is_empty(),
    )
    else {
        return Err(UserError::MissingFields(missing));
    };

    if !is_valid_email(&email) {
        return Err(UserError::Invalid("Invalid email".into()));
    }
    if !email_domain_allowed(&email, allowed_domains) {
        return Err(UserError::Invalid("Invalid email domain".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(UserError::Invalid(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }

    let acm_member = req.acm_member.unwrap_or(false);
    let acm_role = match (acm_member, filled(&req.acm_role)) {
        (true, None) => {
            return Err(UserError::Invalid(
                "ACM Role is required when ACM Member is selected".into(),
            ))
        }
        (true, Some(raw)) => Some(
            AcmRole::parse(&raw)
                .ok_or_else(|| UserError::Invalid(format!("Unknown ACM role: {raw}")))?,
        ),
        (false, _) => None,
    };

    Ok(ValidRegistration {
        full_name,
        email,
        password,
        department,
        registration_number,
        student_id,
        acm_member,
        acm_role,
        year,
        section,
    })
}

#[derive(Debug)]
pub struct ValidRegistration {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub department: String,
    pub registration_number: String,
    pub student_id: Option<String>,
    pub acm_member: bool,
    pub acm_role: Option<AcmRole>,
    pub year: Option<String>,
    pub section: Option<String>,
}

pub async fn register_user(
    state: &AppState,
    req: RegisterRequest,
    mode: RegistrationMode,
) -> Result<User, UserError> {
    let valid = validate_registration(&req, mode, &state.config.allowed_email_domains)?;

    // Field-specific messages first; the UNIQUE constraints still decide races.
    let checks = [
        (UniqueField::Email, Some(valid.email.as_str())),
        (
            UniqueField::RegistrationNumber,
            Some(valid.registration_number.as_str()),
        ),
        (UniqueField::StudentId, valid.student_id.as_deref()),
    ];
    for (field, value) in checks {
        if let Some(value) = value {
            if repo::exists_with(&state.db, field, value).await? {
                warn!(field = field.column(), "duplicate registration");
                return Err(UserError::Duplicate(field));
            }
        }
    }

    let password_hash = hash_password(&valid.password)?;
    let new_user = NewUser {
        id: Uuid::new_v4(),
        full_name: valid.full_name,
        email: valid.email,
        password_hash,
        department: valid.department,
        registration_number: valid.registration_number,
        student_id: valid.student_id,
        acm_member: valid.acm_member,
        acm_role: valid.acm_role,
        year: valid.year,
        section: valid.section,
        join_date: state.campus_now(),
    };

    let user = repo::insert(&state.db, &new_user).await?;
    info!(user_id = %user.id, ?mode, "user registered");
    Ok(user)
}

#[derive(Debug, PartialEq, Eq)]
pub enum AvatarChange {
    Replace(ImageUpload),
    Remove,
}

pub fn parse_data_url(raw: &str) -> Option<ImageUpload> {
    let rest = raw.strip_prefix("data:image/")?;
    let (meta, payload) = rest.split_once(',')?;
    let extension = meta.strip_suffix(";base64")?;
    if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
        return None;
    }
    let bytes = Base64::decode_vec(payload.trim()).ok()?;
    if bytes.is_empty() {
        return None;
    }
    let extension = match extension.to_ascii_lowercase().as_str() {
        "jpeg" => "jpg".to_string(),
        "svg+xml" => "svg".to_string(),
        other => other.to_string(),
    };
    Some(ImageUpload {
        content_type: format!("image/{}", rest.split(';').next().unwrap_or("png")),
        extension,
        bytes,
    })
}

fn optional_text(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn required_text(field: &str, v: Option<String>) -> Result<String, UserError> {
    optional_text(v).ok_or_else(|| UserError::Invalid(format!("{field} cannot be empty")))
}

/// Turns a request into column changes. Role and active flag are honoured for admins only.
pub fn plan_update(
    req: UpdateUserRequest,
    caller_is_admin: bool,
    allowed_domains: &[String],
) -> Result<(Vec<UserChange>, Option<AvatarChange>), UserError> {
    let mut changes = Vec::new();

    if let Some(v) = req.full_name {
        changes.push(UserChange::FullName(required_text("fullName", v)?));
    }
    if let Some(v) = req.email {
        let email = normalize_email(&required_text("email", v)?);
        if !is_valid_email(&email) {
            return Err(UserError::Invalid("Invalid email".into()));
        }
        if !email_domain_allowed(&email, allowed_domains) {
            return Err(UserError::Invalid("Invalid email domain".into()));
        }
        changes.push(UserChange::Email(email));
    }
    if let Some(v) = req.phone {
        changes.push(UserChange::Phone(optional_text(v)));
    }
    if let Some(v) = req.address {
        changes.push(UserChange::Address(optional_text(v)));
    }
    if let Some(v) = req.date_of_birth {
        let date = match optional_text(v) {
            None => None,
            Some(raw) => Some(parse_date(&raw).ok_or_else(|| {
                UserError::Invalid("dateOfBirth must be formatted YYYY-MM-DD".into())
            })?),
        };
        changes.push(UserChange::DateOfBirth(date));
    }
    if let Some(v) = req.department {
        changes.push(UserChange::Department(required_text("department", v)?));
    }
    if let Some(v) = req.student_id {
        changes.push(UserChange::StudentId(optional_text(v)));
    }
    if let Some(v) = req.registration_number {
        changes.push(UserChange::RegistrationNumber(optional_text(v)));
    }
    if let Some(v) = req.acm_member {
        changes.push(UserChange::AcmMember(v));
    }
    if let Some(v) = req.acm_role {
        let role = match optional_text(v) {
            None => None,
            Some(raw) => Some(
                AcmRole::parse(&raw)
                    .ok_or_else(|| UserError::Invalid(format!("Unknown ACM role: {raw}")))?,
            ),
        };
        changes.push(UserChange::AcmRole(role));
    }
    if let Some(v) = req.year {
        changes.push(UserChange::Year(optional_text(v)));
    }
    if let Some(v) = req.section {
        changes.push(UserChange::Section(optional_text(v)));
    }
    if caller_is_admin {
        if let Some(role) = req.role {
            changes.push(UserChange::Role(role));
        }
        if let Some(active) = req.is_active {
            changes.push(UserChange::IsActive(active));
        }
    }

    let avatar = match req.profile_image {
        None => None,
        Some(None) => Some(AvatarChange::Remove),
        Some(Some(raw)) if raw.trim().is_empty() => Some(AvatarChange::Remove),
        Some(Some(raw)) if raw.starts_with("data:image") => Some(AvatarChange::Replace(
            parse_data_url(&raw)
                .ok_or_else(|| UserError::Invalid("Failed to process image upload.".into()))?,
        )),
        // Anything else is the client echoing the current value back.
        Some(Some(_)) => None,
    };

    if changes.is_empty() && avatar.is_none() {
        return Err(UserError::NoChanges);
    }
    Ok((changes, avatar))
}

pub async fn update_user(
    state: &AppState,
    user_id: Uuid,
    caller: &AuthUser,
    req: UpdateUserRequest,
) -> Result<User, UserError> {
    let (mut changes, avatar) =
        plan_update(req, caller.is_admin(), &state.config.allowed_email_domains)?;

    let mut stale_key = None;
    let mut new_key = None;
    if let Some(avatar) = avatar {
        let current = repo::find_by_id(&state.db, user_id)
            .await?
            .ok_or(UserError::NotFound)?;
        stale_key = current.profile_image;
        match avatar {
            AvatarChange::Replace(upload) => {
                let key = state
                    .avatars
                    .save(user_id, upload, state.campus_now())
                    .await?;
                new_key = Some(key.clone());
                changes.push(UserChange::ProfileImage(Some(key)));
            }
            AvatarChange::Remove => changes.push(UserChange::ProfileImage(None)),
        }
    }

    let updated = repo::update(&state.db, user_id, &changes)
        .await
        .map_err(UserError::from)
        .and_then(|u| u.ok_or(UserError::NotFound));
    let user = match updated {
        Ok(user) => user,
        Err(e) => {
            if let Some(key) = new_key {
                remove_avatar(state, &key).await;
            }
            return Err(e);
        }
    };

    if let Some(old) = stale_key {
        if user.profile_image.as_deref() != Some(old.as_str()) {
            remove_avatar(state, &old).await;
        }
    }

    info!(user_id = %user.id, caller = %caller.user_id, fields = changes.len(), "user updated");
    Ok(user)
}

pub async fn delete_user(state: &AppState, user_id: Uuid) -> Result<(), UserError> {
    let avatar = repo::find_by_id(&state.db, user_id)
        .await?
        .and_then(|u| u.profile_image);
    if repo::delete(&state.db, user_id).await? == 0 {
        return Err(UserError::NotFound);
    }
    if let Some(key) = avatar {
        remove_avatar(state, &key).await;
    }
    info!(%user_id, "user deleted");
    Ok(())
}

async fn remove_avatar(state: &AppState, key: &str) {
    if let Err(e) = state.avatars.remove(key).await {
        warn!(error = %e, %key, "failed to delete old avatar");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> RegisterRequest {
        RegisterRequest {
            full_name: Some("Asha Rao".into()),
            email: Some(" Asha@KLU.ac.in ".into()),
            password: Some("secret1".into()),
            department: Some("CSE".into()),
            registration_number: Some("REG2024001".into()),
            acm_member: Some(false),
            acm_role: None,
            year: Some("2".into()),
            section: Some("A".into()),
            student_id: Some("S-1".into()),
        }
    }

    #[test]
    fn admin_registration_needs_core_fields_only() {
        let req = RegisterRequest {
            acm_member: None,
            year: None,
            section: None,
            student_id: None,
            ..complete()
        };
        let ok = validate_registration(&req, RegistrationMode::Admin, &[]).unwrap();
        assert_eq!(ok.email, "asha@klu.ac.in");
        assert!(!ok.acm_member);

        let err = validate_registration(&req, RegistrationMode::SelfServe, &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required fields: acmMember, year, section, studentId"
        );
    }

    #[test]
    fn blank_fields_count_as_missing() {
        let req = RegisterRequest {
            full_name: Some("   ".into()),
            password: None,
            ..complete()
        };
        let err = validate_registration(&req, RegistrationMode::Admin, &[]).unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields: fullName, password");
    }

    #[test]
    fn short_password_and_foreign_domain_are_rejected() {
        let req = RegisterRequest {
            password: Some("12345".into()),
            ..complete()
        };
        assert!(matches!(
            validate_registration(&req, RegistrationMode::Admin, &[]),
            Err(UserError::Invalid(_))
        ));

        let domains = vec!["klu.ac.in".to_string()];
        let req = RegisterRequest {
            email: Some("asha@gmail.com".into()),
            ..complete()
        };
        let err = validate_registration(&req, RegistrationMode::Admin, &domains).unwrap_err();
        assert_eq!(err.to_string(), "Invalid email domain");
    }

    #[test]
    fn acm_member_requires_a_known_role() {
        let req = RegisterRequest {
            acm_member: Some(true),
            ..complete()
        };
        let err = validate_registration(&req, RegistrationMode::SelfServe, &[]).unwrap_err();
        assert_eq!(err.to_string(), "ACM Role is required when ACM Member is selected");

        let req = RegisterRequest {
            acm_member: Some(true),
            acm_role: Some("treasurer".into()),
            ..complete()
        };
        let ok = validate_registration(&req, RegistrationMode::SelfServe, &[]).unwrap();
        assert_eq!(ok.acm_role, Some(AcmRole::Treasurer));
    }

    #[test]
    fn duplicate_messages_are_field_specific() {
        let msgs: Vec<String> = [
            UniqueField::Email,
            UniqueField::RegistrationNumber,
            UniqueField::StudentId,
        ]
        .into_iter()
        .map(|f| UserError::Duplicate(f).to_string())
        .collect();
        assert_eq!(msgs[0], "A user with this email already exists.");
        assert_eq!(msgs[1], "A user with this registration number already exists.");
        assert_eq!(msgs[2], "A user with this student ID already exists.");
        let status = ApiError::from(UserError::Duplicate(UniqueField::Email)).status();
        assert_eq!(status, axum::http::StatusCode::CONFLICT);
    }

    #[test]
    fn empty_update_is_rejected() {
        let err = plan_update(UpdateUserRequest::default(), true, &[]).unwrap_err();
        assert!(matches!(err, UserError::NoChanges));
    }

    #[test]
    fn non_admin_cannot_change_role_or_activation() {
        let req: UpdateUserRequest =
            serde_json::from_str(r#"{"role":"admin","isActive":false}"#).unwrap();
        assert!(matches!(plan_update(req, false, &[]), Err(UserError::NoChanges)));

        let req: UpdateUserRequest =
            serde_json::from_str(r#"{"role":"admin","isActive":false}"#).unwrap();
        let (changes, _) = plan_update(req, true, &[]).unwrap();
        assert_eq!(
            changes,
            vec![
                UserChange::Role(crate::users::Role::Admin),
                UserChange::IsActive(false)
            ]
        );
    }

    #[test]
    fn empty_date_of_birth_clears_the_column() {
        let req: UpdateUserRequest =
            serde_json::from_str(r#"{"dateOfBirth":"","phone":" 98765 "}"#).unwrap();
        let (changes, avatar) = plan_update(req, false, &[]).unwrap();
        assert_eq!(
            changes,
            vec![
                UserChange::Phone(Some("98765".into())),
                UserChange::DateOfBirth(None)
            ]
        );
        assert!(avatar.is_none());
    }

    #[test]
    fn profile_image_variants() {
        let req: UpdateUserRequest =
            serde_json::from_str(r#"{"profileImage":"data:image/png;base64,aGVsbG8="}"#).unwrap();
        let (_, avatar) = plan_update(req, false, &[]).unwrap();
        match avatar {
            Some(AvatarChange::Replace(img)) => {
                assert_eq!(img.extension, "png");
                assert_eq!(img.content_type, "image/png");
                assert_eq!(img.bytes, b"hello".to_vec());
            }
            other => panic!("unexpected {other:?}"),
        }

        let req: UpdateUserRequest = serde_json::from_str(r#"{"profileImage":""}"#).unwrap();
        assert_eq!(plan_update(req, false, &[]).unwrap().1, Some(AvatarChange::Remove));

        let req: UpdateUserRequest =
            serde_json::from_str(r#"{"profileImage":"data:image/png;base64,@@@"}"#).unwrap();
        assert!(matches!(plan_update(req, false, &[]), Err(UserError::Invalid(_))));
    }

    #[test]
    fn jpeg_uploads_use_jpg_extension() {
        let img = parse_data_url("data:image/jpeg;base64,aGVsbG8=").unwrap();
        assert_eq!(img.extension, "jpg");
        assert_eq!(img.content_type, "image/jpeg");
        assert!(parse_data_url("data:text/plain;base64,aGVsbG8=").is_none());
    }

    fn state_with(db: sqlx::PgPool) -> (AppState, std::sync::Arc<crate::state::testing::FakeAvatars>) {
        let avatars = std::sync::Arc::new(crate::state::testing::FakeAvatars::default());
        let state = AppState::from_parts(
            db,
            std::sync::Arc::new(crate::state::testing::test_config()),
            avatars.clone(),
        );
        (state, avatars)
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn duplicates_are_reported_per_field(db: sqlx::PgPool) {
        let (state, _) = state_with(db);
        register_user(&state, complete(), RegistrationMode::SelfServe)
            .await
            .unwrap();

        let cases = [
            (
                RegisterRequest {
                    registration_number: Some("REG2024999".into()),
                    student_id: Some("S-9".into()),
                    ..complete()
                },
                UniqueField::Email,
            ),
            (
                RegisterRequest {
                    email: Some("other@klu.ac.in".into()),
                    student_id: Some("S-9".into()),
                    ..complete()
                },
                UniqueField::RegistrationNumber,
            ),
            (
                RegisterRequest {
                    email: Some("other@klu.ac.in".into()),
                    registration_number: Some("REG2024999".into()),
                    ..complete()
                },
                UniqueField::StudentId,
            ),
        ];
        for (req, field) in cases {
            match register_user(&state, req, RegistrationMode::SelfServe).await {
                Err(UserError::Duplicate(got)) => assert_eq!(got, field),
                other => panic!("expected duplicate {field:?}, got {other:?}"),
            }
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn replacing_an_avatar_removes_the_old_object(db: sqlx::PgPool) {
        let (state, avatars) = state_with(db);
        let user = register_user(&state, complete(), RegistrationMode::Admin)
            .await
            .unwrap();
        let caller = AuthUser {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
        };

        let upload = || -> UpdateUserRequest {
            serde_json::from_str(r#"{"profileImage":"data:image/png;base64,aGVsbG8="}"#).unwrap()
        };
        let first = update_user(&state, user.id, &caller, upload()).await.unwrap();
        let first_key = first.profile_image.clone().unwrap();
        assert!(first_key.starts_with(&format!("avatars/{}-", user.id)));

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let second = update_user(&state, user.id, &caller, upload()).await.unwrap();
        assert_ne!(second.profile_image, first.profile_image);
        assert_eq!(*avatars.removed.lock().unwrap(), vec![first_key]);

        let cleared: UpdateUserRequest = serde_json::from_str(r#"{"profileImage":""}"#).unwrap();
        let third = update_user(&state, user.id, &caller, cleared).await.unwrap();
        assert_eq!(third.profile_image, None);
        assert_eq!(avatars.removed.lock().unwrap().len(), 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn failed_update_discards_the_uploaded_avatar(db: sqlx::PgPool) {
        let (state, avatars) = state_with(db);
        register_user(&state, complete(), RegistrationMode::SelfServe)
            .await
            .unwrap();
        let other = register_user(
            &state,
            RegisterRequest {
                email: Some("other@klu.ac.in".into()),
                registration_number: Some("REG2024999".into()),
                student_id: Some("S-9".into()),
                ..complete()
            },
            RegistrationMode::SelfServe,
        )
        .await
        .unwrap();
        let caller = AuthUser {
            user_id: other.id,
            email: other.email.clone(),
            role: other.role,
        };

        let req: UpdateUserRequest = serde_json::from_str(
            r#"{"email":"asha@klu.ac.in","profileImage":"data:image/png;base64,aGVsbG8="}"#,
        )
        .unwrap();
        match update_user(&state, other.id, &caller, req).await {
            Err(UserError::Duplicate(UniqueField::Email)) => {}
            res => panic!("expected duplicate email, got {res:?}"),
        }

        let saved = avatars.saved.lock().unwrap().clone();
        assert_eq!(saved.len(), 1);
        assert_eq!(*avatars.removed.lock().unwrap(), saved);
    }
}
