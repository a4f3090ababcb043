pub mod directory;
pub mod message_bus;
pub mod repository;

pub use directory::*;
pub use message_bus::*;
pub use repository::*;

use async_trait::async_trait;

use crate::errors::HerqlesResult;

/// 可探测健康状态的组件
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn health_check(&self) -> HerqlesResult<()>;
}
