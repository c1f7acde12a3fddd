use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{header::LOCATION, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument};
use uuid::Uuid;

use super::{
    dto::{LookupView, RegisterRequest, UpdateUserRequest, UserView},
    repo,
    services::{delete_user, register_user, update_user, RegistrationMode},
};
use crate::{
    auth::{AdminOnly, AdminOrSelf, AnyRole, Authorized},
    error::{ApiError, ApiResult},
    response::{created, ApiResponse},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/register", post(self_register))
        .route("/users/lookup/:identifier", get(lookup_user))
        .route(
            "/users/:user_id",
            get(get_user).patch(patch_user).delete(remove_user),
        )
        .route("/users/:user_id/avatar", get(get_avatar))
}

#[instrument(skip(state, payload))]
pub async fn self_register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(payload) = payload?;
    let user = register_user(&state, payload, RegistrationMode::SelfServe).await?;
    Ok(created(UserView::from(&user), "User registered successfully"))
}

#[instrument(skip(state, _auth))]
pub async fn list_users(
    State(state): State<AppState>,
    _auth: Authorized<AdminOnly>,
) -> ApiResult<ApiResponse<Vec<UserView>>> {
    let users = repo::list_all(&state.db, None).await?;
    Ok(ApiResponse::ok(users.iter().map(UserView::from).collect()))
}

/// Resolves a scanned code to the student it belongs to.
#[instrument(skip(state, _auth))]
pub async fn lookup_user(
    State(state): State<AppState>,
    _auth: Authorized<AnyRole>,
    Path(identifier): Path<String>,
) -> ApiResult<ApiResponse<LookupView>> {
    let user = repo::find_by_identifier(&state.db, identifier.trim())
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let avatar = match &user.profile_image {
        Some(key) => match state.avatars.signed_url(key).await {
            Ok(url) => Some(url),
            Err(e) => {
                error!(error = %e, %key, "presign avatar failed");
                None
            }
        },
        None => None,
    };

    Ok(ApiResponse::ok(LookupView {
        id: user.id,
        name: user.full_name,
        registration_number: user.registration_number,
        department: user.department,
        avatar,
    }))
}

#[instrument(skip(state, _auth))]
pub async fn get_user(
    State(state): State<AppState>,
    _auth: Authorized<AdminOrSelf>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ApiResponse<UserView>> {
    let Path(user_id) = user_id?;
    let user = repo::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(ApiResponse::ok(UserView::from(&user)))
}

#[instrument(skip(state, auth, payload))]
pub async fn patch_user(
    State(state): State<AppState>,
    auth: Authorized<AdminOrSelf>,
    user_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> ApiResult<ApiResponse<UserView>> {
    let Path(user_id) = user_id?;
    let Json(payload) = payload?;
    let user = update_user(&state, user_id, &auth.user, payload).await?;
    Ok(ApiResponse::ok(UserView::from(&user)).with_message("User updated successfully"))
}

#[instrument(skip(state, _auth))]
pub async fn remove_user(
    State(state): State<AppState>,
    _auth: Authorized<AdminOnly>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ApiResponse<()>> {
    let Path(user_id) = user_id?;
    delete_user(&state, user_id).await?;
    Ok(ApiResponse::done("User deleted successfully"))
}

/// 302 to a short-lived presigned URL of the stored profile image.
#[instrument(skip(state, _auth))]
pub async fn get_avatar(
    State(state): State<AppState>,
    _auth: Authorized<AdminOrSelf>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Response> {
    let Path(user_id) = user_id?;
    let key = repo::find_by_id(&state.db, user_id)
        .await?
        .and_then(|u| u.profile_image)
        .ok_or_else(|| ApiError::not_found("No profile image"))?;

    let url = state.avatars.signed_url(&key).await?;
    Ok((StatusCode::FOUND, [(LOCATION, url)]).into_response())
}
