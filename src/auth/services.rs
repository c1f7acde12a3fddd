use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use super::jwt::JwtKeys;
use crate::{error::ApiError, users::{repo, User}};

pub const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// `allowed` holds lower-cased domains; an empty list admits every domain.
pub(crate) fn email_domain_allowed(email: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match email.rsplit_once('@') {
        Some((_, domain)) => {
            let domain = domain.to_lowercase();
            allowed.iter().any(|d| *d == domain)
        }
        None => false,
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

const BAD_CREDENTIALS: &str = "Incorrect email or password";

/// Checks credentials, stamps `last_login` and issues a token.
pub async fn authenticate(
    db: &PgPool,
    keys: &JwtKeys,
    email: &str,
    password: &str,
    now: OffsetDateTime,
) -> Result<(User, String), ApiError> {
    let user = match repo::find_by_email(db, email).await? {
        Some(u) if u.is_active => u,
        Some(u) => {
            warn!(user_id = %u.id, "login on inactive account");
            return Err(ApiError::Unauthorized(BAD_CREDENTIALS.into()));
        }
        None => {
            warn!(%email, "login unknown email");
            return Err(ApiError::Unauthorized(BAD_CREDENTIALS.into()));
        }
    };

    if !verify_password(password, &user.password_hash)? {
        warn!(%email, user_id = %user.id, "login invalid password");
        return Err(ApiError::Unauthorized(BAD_CREDENTIALS.into()));
    }

    let user = repo::touch_last_login(db, user.id, now).await?.unwrap_or(user);
    let token = keys.sign(user.id, &user.email, user.role)?;

    info!(user_id = %user.id, role = %user.role, "user logged in");
    Ok((user, token))
}
