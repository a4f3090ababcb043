use async_trait::async_trait;
use herqles_auth::AuthorizationService;
use herqles_core::{
    models::{ValidateReply, ValidateRequest},
    traits::{Binding, Delivery},
    HerqlesResult,
};
use serde_json::Value;

use super::SECURITY_VALIDATE_QUEUE;
use crate::subscriber::MessageHandler;

/// 为其他组件校验令牌与权限
pub struct ValidateTokenHandler {
    authorization: AuthorizationService,
}

impl ValidateTokenHandler {
    pub fn new(authorization: AuthorizationService) -> Self {
        Self { authorization }
    }
}

#[async_trait]
impl MessageHandler for ValidateTokenHandler {
    fn binding(&self) -> Binding {
        Binding::new("security", "validate", SECURITY_VALIDATE_QUEUE)
    }

    async fn handle(&self, delivery: &Delivery) -> HerqlesResult<Option<Value>> {
        let request: ValidateRequest = delivery.json()?;
        let user = self
            .authorization
            .validate(&request.token, request.permission.as_deref())
            .await?;
        Ok(Some(serde_json::to_value(ValidateReply { code: 200, user })?))
    }
}
