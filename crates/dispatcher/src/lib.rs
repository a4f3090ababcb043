//! 控制面消息处理：Worker注册表、任务调度状态机与总线订阅

pub mod handlers;
pub mod registry;
pub mod state_machine;
pub mod subscriber;
pub mod task_dispatcher;

pub use handlers::control_plane_handlers;
pub use registry::WorkerRegistry;
pub use subscriber::{MessageHandler, SubscriberSet};
pub use task_dispatcher::{ReportOutcome, TaskDispatcher};
