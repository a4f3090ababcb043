use axum::{extract::State, http::StatusCode, Json};
use herqles_core::{
    traits::{HealthCheck, MessageBus},
    HerqlesResult,
};
use serde_json::{json, Value};

use crate::routes::AppState;

fn probe(result: HerqlesResult<()>) -> (bool, Value) {
    match result {
        Ok(()) => (true, json!("ok")),
        Err(e) => (false, json!(e.to_string())),
    }
}

/// 探测数据库与消息总线，任一失败返回500
pub async fn ping(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let (sql_ok, sql) = probe(state.ctx.store.health_check().await);
    let (bus_ok, bus) = probe(state.ctx.bus.health_check().await);

    let status = if sql_ok && bus_ok {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (status, Json(json!({ "sql": sql, "rabbitmq": bus })))
}
