use axum::{extract::State, routing::get, Router};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::instrument;

use crate::{
    attendance::services::today_count,
    auth::{AnyRole, Authorized},
    error::{ApiError, ApiResult},
    response::ApiResponse,
    state::AppState,
    users::repo as users,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub today_attendance: i64,
    pub total_users: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard/stats", get(dashboard_stats))
}

/// Live counters: today's attendance and active student accounts.
#[instrument(skip(state, _auth))]
pub async fn dashboard_stats(
    State(state): State<AppState>,
    _auth: Authorized<AnyRole>,
) -> ApiResult<ApiResponse<DashboardStats>> {
    let now = state.campus_now();
    let (today_attendance, total_users) = tokio::try_join!(
        today_count(&state.db, now.date()),
        async { users::count_active_students(&state.db).await.map_err(ApiError::from) },
    )?;

    Ok(ApiResponse::ok(DashboardStats {
        today_attendance,
        total_users,
        timestamp: now,
    }))
}
