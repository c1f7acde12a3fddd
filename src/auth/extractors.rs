use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, RawPathParams},
    http::{header::AUTHORIZATION, request::Parts},
};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use super::jwt::JwtKeys;
use crate::{error::ApiError, users::Role};

/// Why a request was turned away before reaching its handler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Unauthorized: Missing token")]
    MissingToken,
    #[error("Unauthorized: Invalid token format")]
    BadFormat,
    #[error("Token expired. Please log in again.")]
    Expired,
    #[error("Invalid or malformed token")]
    Invalid,
    #[error("Access denied")]
    Forbidden,
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Forbidden => ApiError::Forbidden(e.to_string()),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

/// Identity decoded from a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// `owner` is the `user_id` path parameter of the route, if it has one.
    pub fn permits(&self, allowed: &[Allow], owner: Option<Uuid>) -> bool {
        allowed.iter().any(|rule| match rule {
            Allow::Admin => self.role == Role::Admin,
            Allow::User => self.role == Role::User,
            Allow::Owner => owner == Some(self.user_id),
        })
    }
}

pub(crate) fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingToken)?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::MissingToken)?
        .trim();
    if token.is_empty() || token == "null" || token == "undefined" {
        return Err(AuthError::BadFormat);
    }
    Ok(token)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let token = bearer_token(header).map_err(|e| {
            warn!(reason = %e, "rejected authorization header");
            e
        })?;

        let claims = JwtKeys::from_ref(state).verify(token)?;
        Ok(AuthUser {
            user_id: claims.user_id,
            email: claims.email,
            role: claims.role,
        })
    }
}

/// One entry of a route's allowed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allow {
    Admin,
    User,
    /// The route's `user_id` path parameter is the caller's own id.
    Owner,
}

/// Allowed set declared by a route.
pub trait Policy: Send + Sync + 'static {
    const ALLOWED: &'static [Allow];
}

pub struct AdminOnly;
pub struct AdminOrSelf;
pub struct AnyRole;

impl Policy for AdminOnly {
    const ALLOWED: &'static [Allow] = &[Allow::Admin];
}

impl Policy for AdminOrSelf {
    const ALLOWED: &'static [Allow] = &[Allow::Admin, Allow::Owner];
}

impl Policy for AnyRole {
    const ALLOWED: &'static [Allow] = &[Allow::Admin, Allow::User];
}

/// Authenticated caller that passed the route policy `P`.
pub struct Authorized<P: Policy> {
    pub user: AuthUser,
    _policy: PhantomData<P>,
}

impl<P: Policy> Authorized<P> {
    pub fn into_inner(self) -> AuthUser {
        self.user
    }
}

#[async_trait]
impl<S, P> FromRequestParts<S> for Authorized<P>
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
    P: Policy,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;

        let owner = if P::ALLOWED.contains(&Allow::Owner) {
            RawPathParams::from_request_parts(parts, state)
                .await
                .ok()
                .and_then(|params| {
                    params
                        .iter()
                        .find(|(key, _)| *key == "user_id")
                        .and_then(|(_, value)| Uuid::parse_str(value).ok())
                })
        } else {
            None
        };

        if !user.permits(P::ALLOWED, owner) {
            warn!(user_id = %user.user_id, role = %user.role, path = %parts.uri.path(), "access denied");
            return Err(AuthError::Forbidden.into());
        }

        Ok(Self {
            user,
            _policy: PhantomData,
        })
    }
}
