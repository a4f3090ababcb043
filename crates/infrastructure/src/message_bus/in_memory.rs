use async_trait::async_trait;
use futures::StreamExt;
use herqles_core::{
    traits::{Acknowledger, Binding, Delivery, DeliveryStream, MessageBus, Route},
    HerqlesError, HerqlesResult,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Envelope {
    body: Vec<u8>,
    reply_to: Option<String>,
    correlation_id: Option<String>,
}

struct QueueChannels {
    sender: mpsc::UnboundedSender<Envelope>,
    /// 订阅后被取走
    receiver: Option<mpsc::UnboundedReceiver<Envelope>>,
}

impl QueueChannels {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Some(receiver),
        }
    }
}

#[derive(Default)]
struct BusState {
    bindings: HashMap<Route, Vec<String>>,
    queues: HashMap<String, QueueChannels>,
    /// correlation id -> 回复队列名
    pending: HashMap<String, String>,
    closed: bool,
}

/// 内存消息总线
///
/// 进程内的direct交换机语义：按路由投递到所有绑定队列，未绑定即不可路由。
/// prefetch通过信号量模拟，未确认的消息占用许可。
#[derive(Clone, Default)]
pub struct InMemoryMessageBus {
    state: Arc<Mutex<BusState>>,
}

impl InMemoryMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    async fn route(&self, route: &Route, envelope: Envelope) -> HerqlesResult<()> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(HerqlesError::transport("消息总线已关闭"));
        }

        let queues = state
            .bindings
            .get(route)
            .filter(|queues| !queues.is_empty())
            .ok_or_else(|| HerqlesError::transport(format!("消息不可路由: {route}")))?;

        for queue in queues {
            if let Some(channels) = state.queues.get(queue) {
                channels
                    .sender
                    .send(envelope.clone())
                    .map_err(|_| HerqlesError::transport(format!("队列 {queue} 已关闭")))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, route: &Route, payload: &Value) -> HerqlesResult<String> {
        let correlation_id = Uuid::new_v4().to_string();
        let reply_queue = format!("amq.gen-{}", Uuid::new_v4().simple());

        {
            let mut state = self.state.lock().await;
            state.queues.insert(reply_queue.clone(), QueueChannels::new());
            state
                .pending
                .insert(correlation_id.clone(), reply_queue.clone());
        }

        let envelope = Envelope {
            body: serde_json::to_vec(payload)?,
            reply_to: Some(reply_queue.clone()),
            correlation_id: Some(correlation_id.clone()),
        };

        if let Err(e) = self.route(route, envelope).await {
            let mut state = self.state.lock().await;
            state.pending.remove(&correlation_id);
            state.queues.remove(&reply_queue);
            return Err(e);
        }

        debug!("RPC请求已发布: {} ({})", route, correlation_id);
        Ok(correlation_id)
    }

    async fn await_reply(
        &self,
        correlation_id: &str,
        timeout: Duration,
    ) -> HerqlesResult<Option<Value>> {
        let (reply_queue, mut receiver) = {
            let mut state = self.state.lock().await;
            let reply_queue = state.pending.remove(correlation_id).ok_or_else(|| {
                HerqlesError::internal(format!("未知的correlation id: {correlation_id}"))
            })?;
            let receiver = state
                .queues
                .get_mut(&reply_queue)
                .and_then(|channels| channels.receiver.take())
                .ok_or_else(|| HerqlesError::internal(format!("回复队列不存在: {reply_queue}")))?;
            (reply_queue, receiver)
        };

        let wait = async {
            while let Some(envelope) = receiver.recv().await {
                if envelope.correlation_id.as_deref() == Some(correlation_id) {
                    return serde_json::from_slice::<Value>(&envelope.body).ok();
                }
            }
            None
        };

        let reply = tokio::time::timeout(timeout, wait).await.unwrap_or(None);
        self.state.lock().await.queues.remove(&reply_queue);
        Ok(reply)
    }

    async fn reply_to(
        &self,
        destination: &str,
        correlation_id: &str,
        payload: &Value,
    ) -> HerqlesResult<()> {
        let state = self.state.lock().await;
        let channels = state
            .queues
            .get(destination)
            .ok_or_else(|| HerqlesError::transport(format!("回复队列不存在: {destination}")))?;

        channels
            .sender
            .send(Envelope {
                body: serde_json::to_vec(payload)?,
                reply_to: None,
                correlation_id: Some(correlation_id.to_string()),
            })
            .map_err(|_| HerqlesError::transport(format!("回复队列已关闭: {destination}")))
    }

    async fn send(&self, route: &Route, payload: &Value) -> HerqlesResult<()> {
        let envelope = Envelope {
            body: serde_json::to_vec(payload)?,
            reply_to: None,
            correlation_id: None,
        };
        self.route(route, envelope).await?;
        debug!("消息已发送到: {}", route);
        Ok(())
    }

    async fn subscribe(&self, binding: &Binding) -> HerqlesResult<DeliveryStream> {
        let (sender, receiver) = {
            let mut state = self.state.lock().await;
            let channels = state
                .queues
                .entry(binding.queue.clone())
                .or_insert_with(QueueChannels::new);
            let receiver = channels.receiver.take().ok_or_else(|| {
                HerqlesError::transport(format!("队列 {} 已有消费者", binding.queue))
            })?;
            let sender = channels.sender.clone();

            let bound = state.bindings.entry(binding.route.clone()).or_default();
            if !bound.contains(&binding.queue) {
                bound.push(binding.queue.clone());
            }
            (sender, receiver)
        };

        let permits = Arc::new(Semaphore::new(binding.prefetch.max(1) as usize));

        let stream = futures::stream::unfold(
            (receiver, sender, permits),
            |(mut receiver, sender, permits)| async move {
                // 上一条消息确认前不投递下一条
                let permit = permits.clone().acquire_owned().await.ok()?;
                let envelope = receiver.recv().await?;
                let acker = InMemoryAcknowledger {
                    envelope: envelope.clone(),
                    requeue_to: sender.clone(),
                    permit: Mutex::new(Some(permit)),
                };
                let delivery = Delivery::new(
                    envelope.body,
                    envelope.reply_to,
                    envelope.correlation_id,
                    Arc::new(acker),
                );
                Some((Ok(delivery), (receiver, sender, permits)))
            },
        );

        Ok(stream.boxed())
    }

    async fn health_check(&self) -> HerqlesResult<()> {
        if self.state.lock().await.closed {
            Err(HerqlesError::transport("消息总线已关闭"))
        } else {
            Ok(())
        }
    }

    async fn close(&self) -> HerqlesResult<()> {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.bindings.clear();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}

struct InMemoryAcknowledger {
    envelope: Envelope,
    requeue_to: mpsc::UnboundedSender<Envelope>,
    permit: Mutex<Option<OwnedSemaphorePermit>>,
}

#[async_trait]
impl Acknowledger for InMemoryAcknowledger {
    async fn ack(&self) -> HerqlesResult<()> {
        self.permit.lock().await.take();
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> HerqlesResult<()> {
        if requeue {
            self.requeue_to
                .send(self.envelope.clone())
                .map_err(|_| HerqlesError::transport("重新入队失败"))?;
        }
        self.permit.lock().await.take();
        Ok(())
    }
}

impl Drop for InMemoryAcknowledger {
    fn drop(&mut self) {
        // 未确认的消息在消费者丢弃时回到队列
        if let Ok(mut permit) = self.permit.try_lock() {
            if permit.take().is_some() {
                let _ = self.requeue_to.send(self.envelope.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_unroutable_publish_fails() {
        let bus = InMemoryMessageBus::new();
        let result = bus.publish(&Route::new("worker-x", "alive-y"), &json!({})).await;
        assert!(matches!(result, Err(HerqlesError::Transport(_))));

        let result = bus.send(&Route::new("worker-x", "run-y"), &json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_request_reply_roundtrip() {
        let bus = InMemoryMessageBus::new();
        let mut deliveries = bus
            .subscribe(&Binding::new("security", "validate", "security_validate"))
            .await
            .unwrap();

        let responder = bus.clone();
        tokio::spawn(async move {
            let delivery = deliveries.next().await.unwrap().unwrap();
            let request: Value = delivery.json().unwrap();
            responder
                .reply_to(
                    delivery.reply_to.as_deref().unwrap(),
                    delivery.correlation_id.as_deref().unwrap(),
                    &json!({"echo": request["token"]}),
                )
                .await
                .unwrap();
            delivery.ack().await.unwrap();
        });

        let correlation_id = bus
            .publish(&Route::new("security", "validate"), &json!({"token": "abc"}))
            .await
            .unwrap();
        let reply = bus
            .await_reply(&correlation_id, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, Some(json!({"echo": "abc"})));
    }

    #[tokio::test]
    async fn test_await_reply_times_out_with_none() {
        let bus = InMemoryMessageBus::new();
        let _deliveries = bus
            .subscribe(&Binding::new("worker-w1", "alive-f1", "w1_alive"))
            .await
            .unwrap();

        let correlation_id = bus
            .publish(&Route::worker_alive("w1", "f1"), &json!({}))
            .await
            .unwrap();
        let reply = bus
            .await_reply(&correlation_id, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(reply, None);

        // 回复通道已释放
        assert!(bus
            .await_reply(&correlation_id, Duration::from_millis(10))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_prefetch_one_serializes_deliveries() {
        let bus = InMemoryMessageBus::new();
        let mut deliveries = bus
            .subscribe(&Binding::new("task", "task_status", "task_status"))
            .await
            .unwrap();

        let route = Route::new("task", "task_status");
        bus.send(&route, &json!({"n": 1})).await.unwrap();
        bus.send(&route, &json!({"n": 2})).await.unwrap();

        let first = deliveries.next().await.unwrap().unwrap();
        assert_eq!(first.json::<Value>().unwrap()["n"], json!(1));

        let blocked = tokio::time::timeout(Duration::from_millis(50), deliveries.next()).await;
        assert!(blocked.is_err());

        first.ack().await.unwrap();
        let second = deliveries.next().await.unwrap().unwrap();
        assert_eq!(second.json::<Value>().unwrap()["n"], json!(2));
        second.ack().await.unwrap();
    }

    #[tokio::test]
    async fn test_reject_with_requeue_redelivers() {
        let bus = InMemoryMessageBus::new();
        let mut deliveries = bus
            .subscribe(&Binding::new("worker", "reload", "worker_reload"))
            .await
            .unwrap();

        bus.send(&Route::new("worker", "reload"), &json!({"n": 1}))
            .await
            .unwrap();

        let first = deliveries.next().await.unwrap().unwrap();
        first.reject(true).await.unwrap();

        let again = deliveries.next().await.unwrap().unwrap();
        assert_eq!(again.body, first.body);
        again.ack().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_consumer_rejected_and_close() {
        let bus = InMemoryMessageBus::new();
        let binding = Binding::new("framework", "register", "framework_register");
        let _first = bus.subscribe(&binding).await.unwrap();
        assert!(bus.subscribe(&binding).await.is_err());

        assert!(bus.health_check().await.is_ok());
        bus.close().await.unwrap();
        assert!(bus.health_check().await.is_err());
        assert!(bus
            .send(&Route::new("framework", "register"), &json!({}))
            .await
            .is_err());
    }
}
