use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{ForgotPasswordRequest, LoginRequest, LoginResponse},
        extractors::{AdminOnly, AuthUser, Authorized},
        jwt::JwtKeys,
        services::{authenticate, email_domain_allowed, normalize_email},
    },
    error::{ApiError, ApiResult},
    response::{created, ApiResponse},
    state::AppState,
    users::{
        dto::{RegisterRequest, UserView},
        repo,
        services::{register_user, RegistrationMode},
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<ApiResponse<LoginResponse>> {
    let Json(payload) = payload?;
    let email = normalize_email(&payload.email);

    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }
    if !email_domain_allowed(&email, &state.config.allowed_email_domains) {
        warn!(%email, "login from disallowed domain");
        return Err(ApiError::bad_request("Invalid email domain"));
    }

    let keys = JwtKeys::from_ref(&state);
    let (user, token) =
        authenticate(&state.db, &keys, &email, &payload.password, state.campus_now()).await?;

    Ok(ApiResponse::ok(LoginResponse {
        user: UserView::from(&user),
        token,
    }))
}

/// Admin-created accounts; the self-serve variant lives under `/users/register`.
#[instrument(skip(state, auth, payload))]
pub async fn register(
    State(state): State<AppState>,
    auth: Authorized<AdminOnly>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(payload) = payload?;
    let user = register_user(&state, payload, RegistrationMode::Admin).await?;
    info!(user_id = %user.id, admin_id = %auth.user.user_id, "user registered by admin");
    Ok(created(UserView::from(&user), "User registered successfully"))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> ApiResult<ApiResponse<()>> {
    let Json(payload) = payload?;
    let email = normalize_email(&payload.email);
    if email.is_empty() {
        return Err(ApiError::bad_request("Email is required"));
    }
    if !email_domain_allowed(&email, &state.config.allowed_email_domains) {
        return Err(ApiError::bad_request("Invalid email domain"));
    }

    match repo::find_by_email(&state.db, &email).await? {
        Some(user) if user.is_active => {
            info!(user_id = %user.id, "password reset requested");
            Ok(ApiResponse::done(
                "Password reset instructions have been sent to your email address.",
            ))
        }
        _ => Err(ApiError::not_found("Email address not found")),
    }
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<ApiResponse<UserView>> {
    let user = repo::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;
    Ok(ApiResponse::ok(UserView::from(&user)))
}
