use async_trait::async_trait;
use herqles_core::{
    models::IdReply,
    traits::{Binding, Delivery},
    HerqlesResult,
};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::FRAMEWORK_REGISTER_QUEUE;
use crate::subscriber::MessageHandler;

/// 为新框架分配身份
pub struct RegisterFrameworkHandler;

#[async_trait]
impl MessageHandler for RegisterFrameworkHandler {
    fn binding(&self) -> Binding {
        Binding::new("framework", "register", FRAMEWORK_REGISTER_QUEUE)
    }

    async fn handle(&self, _delivery: &Delivery) -> HerqlesResult<Option<Value>> {
        let id = Uuid::new_v4().to_string();
        info!("注册框架: {}", id);
        Ok(Some(serde_json::to_value(IdReply { id })?))
    }
}
