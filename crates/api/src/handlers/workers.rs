use axum::{
    extract::{Path, Query, State},
    Json,
};
use herqles_core::models::WorkerFilter;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{auth::AuthToken, error::ApiResult, routes::AppState, views::WorkerView};

pub const PERMISSION_WORKER_GET: &str = "herqles.worker.get";
pub const PERMISSION_WORKER_DELETE: &str = "herqles.worker.delete";

#[derive(Debug, Serialize)]
pub struct WorkerList {
    pub workers: Vec<WorkerView>,
}

/// 按 framework/target/datacenter 过滤Worker
pub async fn list_workers(
    State(state): State<AppState>,
    token: AuthToken,
    Query(filter): Query<WorkerFilter>,
) -> ApiResult<Json<WorkerList>> {
    state.authorize(&token, Some(PERMISSION_WORKER_GET)).await?;

    let workers = state.registry.list(&filter).await?;
    Ok(Json(WorkerList {
        workers: workers.into_iter().map(WorkerView::from).collect(),
    }))
}

pub async fn delete_worker(
    State(state): State<AppState>,
    token: AuthToken,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.authorize(&token, Some(PERMISSION_WORKER_DELETE)).await?;

    state.registry.soft_delete(id).await?;

    let mut body = Map::new();
    body.insert(id.to_string(), Value::from("deleted"));
    Ok(Json(Value::Object(body)))
}
