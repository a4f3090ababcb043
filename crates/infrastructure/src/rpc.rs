use herqles_core::{
    traits::{MessageBus, Route},
    HerqlesError, HerqlesResult,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// 请求/应答客户端：发布后在超时内等待回复
#[derive(Clone)]
pub struct RpcClient {
    bus: Arc<dyn MessageBus>,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(bus: Arc<dyn MessageBus>, timeout: Duration) -> Self {
        Self { bus, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 无回复时返回 `ReplyTimeout`
    pub async fn call(&self, route: &Route, payload: &Value) -> HerqlesResult<Value> {
        let correlation_id = self.bus.publish(route, payload).await?;

        match self.bus.await_reply(&correlation_id, self.timeout).await? {
            Some(reply) => Ok(reply),
            None => {
                warn!("RPC {} 在 {:?} 内没有回复", route, self.timeout);
                Err(HerqlesError::ReplyTimeout(route.to_string()))
            }
        }
    }

    pub async fn call_typed<Req, Resp>(&self, route: &Route, request: &Req) -> HerqlesResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_value(request)?;
        let reply = self.call(route, &payload).await?;
        Ok(serde_json::from_value(reply)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_bus::InMemoryMessageBus;
    use futures::StreamExt;
    use herqles_core::traits::Binding;
    use serde_json::json;

    #[tokio::test]
    async fn test_call_returns_reply() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let mut deliveries = bus
            .subscribe(&Binding::new("framework", "register", "framework_register"))
            .await
            .unwrap();

        let responder = bus.clone();
        tokio::spawn(async move {
            let delivery = deliveries.next().await.unwrap().unwrap();
            responder
                .reply_to(
                    delivery.reply_to.as_deref().unwrap(),
                    delivery.correlation_id.as_deref().unwrap(),
                    &json!({"id": "abc"}),
                )
                .await
                .unwrap();
            delivery.ack().await.unwrap();
        });

        let client = RpcClient::new(bus, Duration::from_secs(1));
        let reply = client
            .call(&Route::new("framework", "register"), &json!({}))
            .await
            .unwrap();
        assert_eq!(reply, json!({"id": "abc"}));
    }

    #[tokio::test]
    async fn test_call_timeout_is_transport_failure() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let _deliveries = bus
            .subscribe(&Binding::new("worker-w1", "alive-f1", "w1_alive"))
            .await
            .unwrap();

        let client = RpcClient::new(bus, Duration::from_millis(30));
        let err = client
            .call(&Route::worker_alive("w1", "f1"), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, HerqlesError::ReplyTimeout(_)));
        assert_eq!(err.code(), 503);
    }
}
