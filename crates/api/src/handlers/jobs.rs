use axum::{
    extract::{Path, State},
    Json,
};
use herqles_core::HerqlesError;

use crate::{auth::AuthToken, error::ApiResult, routes::AppState, views::JobView};

pub const PERMISSION_JOB_GET: &str = "herqles.job.get";

pub async fn get_job(
    State(state): State<AppState>,
    token: AuthToken,
    Path(id): Path<i64>,
) -> ApiResult<Json<JobView>> {
    state.authorize(&token, Some(PERMISSION_JOB_GET)).await?;

    let job = state
        .ctx
        .jobs
        .find_by_id(id)
        .await?
        .ok_or(HerqlesError::JobNotFound { id })?;

    Ok(Json(JobView::from(job)))
}
