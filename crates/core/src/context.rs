use std::sync::Arc;
use std::time::Duration;

use crate::traits::{
    AssignmentRepository, DirectoryService, HealthCheck, IdentityRepository, JobRepository,
    MessageBus, TaskRepository, WorkerRepository,
};

/// 服务上下文
///
/// 启动时构建一次，显式传入每个组件的构造函数。
#[derive(Clone)]
pub struct ServiceContext {
    pub workers: Arc<dyn WorkerRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub assignments: Arc<dyn AssignmentRepository>,
    pub identities: Arc<dyn IdentityRepository>,
    pub bus: Arc<dyn MessageBus>,
    pub directory: Option<Arc<dyn DirectoryService>>,
    pub store: Arc<dyn HealthCheck>,
    pub rpc_timeout: Duration,
}

impl ServiceContext {
    pub fn with_directory(mut self, directory: Arc<dyn DirectoryService>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("bus", &self.bus.backend_name())
            .field("directory", &self.directory.is_some())
            .field("rpc_timeout", &self.rpc_timeout)
            .finish()
    }
}
