//! 各总线主题的处理器

mod framework;
mod security;
mod task;
mod worker;

pub use framework::RegisterFrameworkHandler;
pub use security::ValidateTokenHandler;
pub use task::{LaunchTaskHandler, TaskStatusHandler};
pub use worker::{GetWorkersHandler, RegisterWorkerHandler, ReloadWorkerHandler};

use std::sync::Arc;

use herqles_auth::AuthorizationService;
use herqles_core::ServiceContext;

use crate::registry::WorkerRegistry;
use crate::subscriber::MessageHandler;
use crate::task_dispatcher::TaskDispatcher;

pub const FRAMEWORK_REGISTER_QUEUE: &str = "framework_register";
pub const WORKER_REGISTER_QUEUE: &str = "worker_register";
pub const WORKER_RELOAD_QUEUE: &str = "worker_reload";
pub const WORKER_GET_QUEUE: &str = "worker_get";
pub const TASK_LAUNCH_QUEUE: &str = "task_launch";
pub const TASK_STATUS_QUEUE: &str = "task_status";
pub const SECURITY_VALIDATE_QUEUE: &str = "security_validate";

/// 控制面订阅的全部处理器
pub fn control_plane_handlers(
    ctx: &ServiceContext,
    authorization: AuthorizationService,
) -> Vec<Arc<dyn MessageHandler>> {
    let registry = WorkerRegistry::new(ctx.workers.clone());
    let dispatcher = TaskDispatcher::new(ctx);

    vec![
        Arc::new(RegisterFrameworkHandler),
        Arc::new(RegisterWorkerHandler::new(registry.clone())),
        Arc::new(ReloadWorkerHandler::new(registry.clone())),
        Arc::new(GetWorkersHandler::new(registry)),
        Arc::new(LaunchTaskHandler::new(dispatcher.clone())),
        Arc::new(TaskStatusHandler::new(dispatcher)),
        Arc::new(ValidateTokenHandler::new(authorization)),
    ]
}
