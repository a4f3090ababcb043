use std::sync::Arc;

use herqles_core::{
    models::{Tags, Worker, WorkerFilter, WorkerRegistration},
    traits::WorkerRepository,
    HerqlesError, HerqlesResult,
};
use tracing::{debug, info};

/// Worker注册表
#[derive(Clone)]
pub struct WorkerRegistry {
    workers: Arc<dyn WorkerRepository>,
}

impl WorkerRegistry {
    pub fn new(workers: Arc<dyn WorkerRepository>) -> Self {
        Self { workers }
    }

    /// 幂等注册：已存在的 `(target, framework)` 只刷新标签
    pub async fn register(&self, registration: &WorkerRegistration) -> HerqlesResult<i64> {
        if registration.target.is_empty()
            || registration.framework.is_empty()
            || registration.datacenter.is_empty()
        {
            return Err(HerqlesError::validation(
                "target、framework和datacenter均不能为空",
            ));
        }

        let id = self.workers.upsert(registration).await?;
        info!(
            "注册Worker成功: {} ({}/{})",
            id, registration.target, registration.framework
        );
        Ok(id)
    }

    /// 刷新已注册Worker的标签，不存在时什么也不做
    pub async fn reload(&self, target: &str, framework: &str, tags: &Tags) -> HerqlesResult<bool> {
        let updated = self.workers.update_tags(target, framework, tags).await?;
        if !updated {
            debug!("忽略未注册Worker的重载: {}/{}", target, framework);
        }
        Ok(updated)
    }

    pub async fn list(&self, filter: &WorkerFilter) -> HerqlesResult<Vec<Worker>> {
        self.workers.list(filter).await
    }

    pub async fn soft_delete(&self, id: i64) -> HerqlesResult<()> {
        if !self.workers.soft_delete(id).await? {
            return Err(HerqlesError::WorkerNotFound { id });
        }
        info!("Worker已删除: {}", id);
        Ok(())
    }
}
