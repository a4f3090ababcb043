use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::HerqlesResult;
use crate::models::{
    Job, NewJob, Tags, Task, TaskFilter, TaskStatus, Token, UserAssignment, Worker, WorkerFilter,
    WorkerRegistration,
};

/// Worker仓储接口
#[async_trait]
pub trait WorkerRepository: Send + Sync {
    /// 按 `(target, framework)` 插入或刷新标签，返回Worker ID
    async fn upsert(&self, registration: &WorkerRegistration) -> HerqlesResult<i64>;

    /// 仅更新已存在且未删除的Worker标签，返回是否命中
    async fn update_tags(&self, target: &str, framework: &str, tags: &Tags) -> HerqlesResult<bool>;

    /// 查找未删除的Worker
    async fn find_active(&self, id: i64) -> HerqlesResult<Option<Worker>>;

    async fn list(&self, filter: &WorkerFilter) -> HerqlesResult<Vec<Worker>>;

    /// 软删除，返回是否命中未删除的记录
    async fn soft_delete(&self, id: i64) -> HerqlesResult<bool>;
}

/// 随状态变更一并写入的字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub status: TaskStatus,
    pub error_message: Option<String>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl StatusChange {
    pub fn to(status: TaskStatus) -> Self {
        Self {
            status,
            error_message: None,
            stopped_at: None,
        }
    }
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> HerqlesResult<Option<Task>>;

    async fn list(&self, filter: &TaskFilter) -> HerqlesResult<Vec<Task>>;

    /// 仅当当前状态等于 `expected` 时写入，返回是否写入成功
    async fn compare_and_set_status(
        &self,
        id: i64,
        expected: TaskStatus,
        change: &StatusChange,
    ) -> HerqlesResult<bool>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 在一个事务中写入作业、目标、任务和动作
    async fn create(&self, job: &NewJob) -> HerqlesResult<i64>;

    async fn find_by_id(&self, id: i64) -> HerqlesResult<Option<Job>>;
}

/// 授权记录、令牌与权限的存储
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn find_by_username(&self, username: &str) -> HerqlesResult<Option<UserAssignment>>;

    /// 创建授权记录；已存在时返回现有记录
    async fn create(&self, username: &str) -> HerqlesResult<UserAssignment>;

    async fn delete(&self, username: &str) -> HerqlesResult<bool>;

    async fn find_token(&self, assignment_id: i64) -> HerqlesResult<Option<Token>>;

    async fn find_by_token(&self, token: &str) -> HerqlesResult<Option<(UserAssignment, Token)>>;

    /// 替换授权记录的令牌，窗口从 `updated_at` 重新开始
    async fn store_token(
        &self,
        assignment_id: i64,
        token: &str,
        updated_at: DateTime<Utc>,
    ) -> HerqlesResult<Token>;

    async fn list_permissions(&self, assignment_id: i64) -> HerqlesResult<Vec<String>>;

    async fn add_permission(&self, assignment_id: i64, permission: &str) -> HerqlesResult<()>;

    async fn remove_permission(&self, assignment_id: i64, permission: &str) -> HerqlesResult<bool>;
}

/// 本地身份(密码哈希)存储
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_password_hash(&self, username: &str) -> HerqlesResult<Option<String>>;

    async fn create(&self, username: &str, password_hash: &str) -> HerqlesResult<()>;

    async fn update_password(&self, username: &str, password_hash: &str) -> HerqlesResult<bool>;

    async fn delete(&self, username: &str) -> HerqlesResult<bool>;
}
