use axum::{extract::State, routing::get, Router};
use tracing::instrument;

use super::{repo, repo_types::Subject};
use crate::{
    auth::{AnyRole, Authorized},
    error::ApiResult,
    response::ApiResponse,
    state::AppState,
};

pub fn subject_routes() -> Router<AppState> {
    Router::new().route("/subjects", get(list_subjects))
}

#[instrument(skip(state, _auth))]
pub async fn list_subjects(
    State(state): State<AppState>,
    _auth: Authorized<AnyRole>,
) -> ApiResult<ApiResponse<Vec<Subject>>> {
    Ok(ApiResponse::ok(repo::list_all(&state.db).await?))
}
