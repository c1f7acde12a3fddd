use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{
    dto::{EntryView, MarkRequest, MarkedView, StatsView, StudentStatsView},
    repo,
    services::{
        all_attendance_stats, attendance_stats, delete_attendance, mark_attendance, resolve_marker,
    },
};
use crate::{
    auth::{AdminOnly, AdminOrSelf, AnyRole, AuthUser, Authorized},
    error::{ApiError, ApiResult},
    format::parse_date,
    response::{created, ApiResponse},
    state::AppState,
};

pub fn attendance_routes() -> Router<AppState> {
    Router::new()
        .route("/attendance", get(list_today_admin))
        .route("/attendance/mark", post(mark))
        .route("/attendance/today", get(list_today))
        .route("/attendance/daily/:date", get(list_daily))
        .route("/attendance/user/:user_id", get(list_for_user))
        .route("/attendance/stats", get(stats_for_all))
        .route("/attendance/stats/:user_id", get(stats_for_user))
        .route("/attendance/:id", delete(remove))
}

#[instrument(skip(state, caller, payload))]
pub async fn mark(
    State(state): State<AppState>,
    caller: AuthUser,
    payload: Result<Json<MarkRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(payload) = payload?;
    let user_id = payload
        .user_id
        .ok_or_else(|| ApiError::bad_request("userId is required"))?;

    if !caller.is_admin() && user_id != caller.user_id {
        warn!(caller = %caller.user_id, target = %user_id, "mark for another user refused");
        return Err(ApiError::forbidden(
            "Access denied: You can only mark your own attendance.",
        ));
    }
    let marked_by = resolve_marker(&caller, payload.marked_by);

    let (record, subject) = mark_attendance(
        &state.db,
        user_id,
        &payload.subject,
        Some(marked_by),
        payload.qr_code.as_deref(),
        state.campus_now(),
    )
    .await?;

    Ok(created(
        MarkedView::new(&record, &subject.subject_name),
        "Attendance marked successfully",
    ))
}

async fn today_entries(state: &AppState) -> ApiResult<Vec<EntryView>> {
    let today = state.campus_now().date();
    let rows = repo::list_by_date(&state.db, today).await?;
    Ok(rows.into_iter().map(EntryView::from).collect())
}

#[instrument(skip(state, _auth))]
pub async fn list_today_admin(
    State(state): State<AppState>,
    _auth: Authorized<AdminOnly>,
) -> ApiResult<ApiResponse<Vec<EntryView>>> {
    Ok(ApiResponse::ok(today_entries(&state).await?))
}

#[instrument(skip(state, _auth))]
pub async fn list_today(
    State(state): State<AppState>,
    _auth: Authorized<AnyRole>,
) -> ApiResult<ApiResponse<Vec<EntryView>>> {
    Ok(ApiResponse::ok(today_entries(&state).await?))
}

#[instrument(skip(state, _auth))]
pub async fn list_daily(
    State(state): State<AppState>,
    _auth: Authorized<AdminOnly>,
    Path(date): Path<String>,
) -> ApiResult<ApiResponse<Vec<EntryView>>> {
    let date = parse_date(&date)
        .ok_or_else(|| ApiError::bad_request("Date must be formatted YYYY-MM-DD"))?;
    let rows = repo::list_by_date(&state.db, date).await?;
    Ok(ApiResponse::ok(rows.into_iter().map(EntryView::from).collect()))
}

#[instrument(skip(state, _auth))]
pub async fn list_for_user(
    State(state): State<AppState>,
    _auth: Authorized<AdminOrSelf>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ApiResponse<Vec<EntryView>>> {
    let Path(user_id) = user_id?;
    let rows = repo::list_by_user(&state.db, user_id).await?;
    Ok(ApiResponse::ok(rows.into_iter().map(EntryView::from).collect()))
}

#[instrument(skip(state, _auth))]
pub async fn stats_for_all(
    State(state): State<AppState>,
    _auth: Authorized<AdminOnly>,
) -> ApiResult<ApiResponse<Vec<StudentStatsView>>> {
    Ok(ApiResponse::ok(all_attendance_stats(&state.db).await?))
}

#[instrument(skip(state, _auth))]
pub async fn stats_for_user(
    State(state): State<AppState>,
    _auth: Authorized<AdminOrSelf>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ApiResponse<StatsView>> {
    let Path(user_id) = user_id?;
    Ok(ApiResponse::ok(attendance_stats(&state.db, user_id).await?))
}

#[instrument(skip(state, auth))]
pub async fn remove(
    State(state): State<AppState>,
    auth: Authorized<AdminOnly>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<ApiResponse<()>> {
    let Path(id) = id?;
    delete_attendance(&state.db, id).await?;
    warn!(attendance_id = id, admin_id = %auth.user.user_id, "attendance unmarked");
    Ok(ApiResponse::done("Attendance record deleted successfully."))
}
