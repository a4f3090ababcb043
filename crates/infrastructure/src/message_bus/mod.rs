pub mod in_memory;
pub mod rabbitmq;

pub use in_memory::InMemoryMessageBus;
pub use rabbitmq::RabbitMQMessageBus;

use herqles_core::{
    config::{MessageQueueConfig, MessageQueueType},
    traits::MessageBus,
    HerqlesResult,
};
use std::sync::Arc;
use tracing::{debug, info};

pub struct MessageBusFactory;

impl MessageBusFactory {
    /// 按配置创建消息总线
    pub async fn create(config: &MessageQueueConfig) -> HerqlesResult<Arc<dyn MessageBus>> {
        debug!("Creating message bus with type: {:?}", config.kind);

        match config.kind {
            MessageQueueType::Rabbitmq => {
                info!("Initializing RabbitMQ message bus");
                let bus = RabbitMQMessageBus::connect(&config.url).await?;
                Ok(Arc::new(bus))
            }
            MessageQueueType::InMemory => {
                info!("Initializing in-memory message bus");
                Ok(Arc::new(InMemoryMessageBus::new()))
            }
        }
    }
}
