pub mod sqlite_assignment_repository;
pub mod sqlite_identity_repository;
pub mod sqlite_job_repository;
pub mod sqlite_task_repository;
pub mod sqlite_worker_repository;

pub use sqlite_assignment_repository::SqliteAssignmentRepository;
pub use sqlite_identity_repository::SqliteIdentityRepository;
pub use sqlite_job_repository::SqliteJobRepository;
pub use sqlite_task_repository::SqliteTaskRepository;
pub use sqlite_worker_repository::SqliteWorkerRepository;

use herqles_core::{HerqlesError, HerqlesResult};
use serde::{de::DeserializeOwned, Serialize};

/// JSON列编码
pub(crate) fn encode_json<T: Serialize>(value: &T, what: &str) -> HerqlesResult<String> {
    serde_json::to_string(value)
        .map_err(|e| HerqlesError::Serialization(format!("序列化{what}失败: {e}")))
}

/// JSON列解码
pub(crate) fn decode_json<T: DeserializeOwned>(raw: &str, what: &str) -> HerqlesResult<T> {
    serde_json::from_str(raw)
        .map_err(|e| HerqlesError::Serialization(format!("解析{what}失败: {e}")))
}
