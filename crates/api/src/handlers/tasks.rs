use axum::{
    extract::{Path, Query, State},
    Json,
};
use herqles_core::{models::TaskFilter, HerqlesError};
use serde::{Deserialize, Serialize};

use crate::{auth::AuthToken, error::ApiResult, routes::AppState, views::TaskView};

pub const PERMISSION_TASK_GET: &str = "herqles.task.get";

/// 任务查询参数
#[derive(Debug, Deserialize)]
pub struct TaskQueryParams {
    pub job_id: Option<i64>,
    pub page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TaskPage {
    pub page: i64,
    pub tasks: Vec<TaskView>,
}

/// 分页列出任务，每页20条，新任务在前
pub async fn list_tasks(
    State(state): State<AppState>,
    token: AuthToken,
    Query(params): Query<TaskQueryParams>,
) -> ApiResult<Json<TaskPage>> {
    state.authorize(&token, Some(PERMISSION_TASK_GET)).await?;

    let filter = TaskFilter {
        job_id: params.job_id,
        page: params.page.unwrap_or(1),
    };
    let tasks = state.ctx.tasks.list(&filter).await?;

    Ok(Json(TaskPage {
        page: filter.page,
        tasks: tasks.into_iter().map(TaskView::from).collect(),
    }))
}

pub async fn get_task(
    State(state): State<AppState>,
    token: AuthToken,
    Path(id): Path<i64>,
) -> ApiResult<Json<TaskView>> {
    state.authorize(&token, Some(PERMISSION_TASK_GET)).await?;

    let task = state
        .ctx
        .tasks
        .find_by_id(id)
        .await?
        .ok_or(HerqlesError::TaskNotFound { id })?;

    Ok(Json(TaskView::from(task)))
}
