use herqles_core::{traits::MessageBus, ServiceContext};
use std::sync::Arc;
use std::time::Duration;

use crate::database::{
    DatabaseManager, SqliteAssignmentRepository, SqliteIdentityRepository, SqliteJobRepository,
    SqliteTaskRepository, SqliteWorkerRepository,
};

/// 以SQLite仓储组装服务上下文
pub fn sqlite_context(
    database: &DatabaseManager,
    bus: Arc<dyn MessageBus>,
    rpc_timeout: Duration,
) -> ServiceContext {
    let pool = database.pool().clone();
    ServiceContext {
        workers: Arc::new(SqliteWorkerRepository::new(pool.clone())),
        tasks: Arc::new(SqliteTaskRepository::new(pool.clone())),
        jobs: Arc::new(SqliteJobRepository::new(pool.clone())),
        assignments: Arc::new(SqliteAssignmentRepository::new(pool.clone())),
        identities: Arc::new(SqliteIdentityRepository::new(pool)),
        bus,
        directory: None,
        store: Arc::new(database.clone()),
        rpc_timeout,
    }
}
