use axum::{
    extract::{rejection::PathRejection, Path, State},
    response::Response,
    routing::get,
    Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::csv::{acm_csv, attachment, daily_csv, file_stem, students_csv, user_csv};
use crate::{
    attendance::{dto::EntryView, repo as attendance, services::all_attendance_stats},
    auth::{AdminOnly, Authorized},
    error::{ApiError, ApiResult},
    format::{date_string, parse_date},
    state::AppState,
    users::repo as users,
};

pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/reports/students", get(students_report))
        .route("/reports/daily/:date", get(daily_report))
        .route("/reports/acm", get(acm_report))
        .route("/reports/user/:user_id", get(user_report))
}

#[instrument(skip(state, _auth))]
pub async fn students_report(
    State(state): State<AppState>,
    _auth: Authorized<AdminOnly>,
) -> ApiResult<Response> {
    let stats = all_attendance_stats(&state.db).await?;
    info!(rows = stats.len(), "students report");
    let name = format!("students-{}.csv", date_string(state.campus_now().date()));
    Ok(attachment(&name, students_csv(&stats)))
}

#[instrument(skip(state, _auth))]
pub async fn daily_report(
    State(state): State<AppState>,
    _auth: Authorized<AdminOnly>,
    Path(date): Path<String>,
) -> ApiResult<Response> {
    let day = parse_date(&date)
        .ok_or_else(|| ApiError::bad_request("Date must be formatted YYYY-MM-DD"))?;
    let entries: Vec<EntryView> = attendance::list_by_date(&state.db, day)
        .await?
        .into_iter()
        .map(EntryView::from)
        .collect();
    let name = format!("attendance-{}.csv", date_string(day));
    Ok(attachment(&name, daily_csv(&entries)))
}

#[instrument(skip(state, _auth))]
pub async fn acm_report(
    State(state): State<AppState>,
    _auth: Authorized<AdminOnly>,
) -> ApiResult<Response> {
    let stats = all_attendance_stats(&state.db).await?;
    Ok(attachment("acm-members.csv", acm_csv(&stats)))
}

#[instrument(skip(state, _auth))]
pub async fn user_report(
    State(state): State<AppState>,
    _auth: Authorized<AdminOnly>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Response> {
    let Path(user_id) = user_id?;
    let user = users::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let entries: Vec<EntryView> = attendance::list_by_user(&state.db, user_id)
        .await?
        .into_iter()
        .map(EntryView::from)
        .collect();
    let name = format!("attendance-{}.csv", file_stem(&user.qr_payload()));
    Ok(attachment(&name, user_csv(&entries)))
}
