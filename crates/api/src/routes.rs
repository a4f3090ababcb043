use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use herqles_auth::UserService;
use herqles_core::{models::Principal, HerqlesResult, ServiceContext};
use herqles_dispatcher::WorkerRegistry;

use crate::auth::{AuthToken, TokenValidator};
use crate::handlers::{health, jobs, tasks, users, workers};
use crate::middleware::trace_layer;

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub ctx: ServiceContext,
    pub registry: WorkerRegistry,
    pub users: UserService,
    pub validator: Arc<dyn TokenValidator>,
}

impl AppState {
    pub fn new(ctx: ServiceContext, users: UserService, validator: Arc<dyn TokenValidator>) -> Self {
        Self {
            registry: WorkerRegistry::new(ctx.workers.clone()),
            ctx,
            users,
            validator,
        }
    }

    pub async fn authorize(
        &self,
        token: &AuthToken,
        permission: Option<&str>,
    ) -> HerqlesResult<Principal> {
        self.validator.validate(&token.0, permission).await
    }
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/_ping", get(health::ping))
        .route("/_heartbeat", get(health::ping))
        .route("/job/{id}", get(jobs::get_job))
        .route("/task", get(tasks::list_tasks))
        .route("/task/{id}", get(tasks::get_task))
        .route("/worker", get(workers::list_workers))
        .route("/worker/{id}", delete(workers::delete_worker))
        .route("/user/add", post(users::add_user))
        .route("/user/token", put(users::issue_token))
        .route("/user/password", put(users::change_password))
        .route(
            "/user/permission",
            put(users::add_permission).delete(users::remove_permission),
        )
        .route(
            "/user/{username}",
            get(users::get_user).delete(users::delete_user),
        )
        .layer(trace_layer())
        .with_state(state)
}
