use async_trait::async_trait;
use futures::StreamExt;
use herqles_core::{
    traits::{Acknowledger, Binding, Delivery, DeliveryStream, MessageBus, Route},
    HerqlesError, HerqlesResult,
};
use lapin::{
    options::*, publisher_confirm::Confirmation, types::FieldTable, BasicProperties, Channel,
    Connection, ConnectionProperties, Consumer, ExchangeKind,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 发布后仍未进入 `await_reply` 的条目视为调用方已放弃
const PENDING_TTL: Duration = Duration::from_secs(60);

/// 等待回复的RPC请求：独占回复队列所在的通道及其消费者
struct PendingReply {
    channel: Channel,
    consumer: Consumer,
}

/// 按correlation id登记的待回复请求，带登记时间
struct PendingReplies<T> {
    entries: HashMap<String, (Instant, T)>,
}

impl<T> PendingReplies<T> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn insert(&mut self, correlation_id: String, reply: T, now: Instant) {
        self.entries.insert(correlation_id, (now, reply));
    }

    fn take(&mut self, correlation_id: &str) -> Option<T> {
        self.entries.remove(correlation_id).map(|(_, reply)| reply)
    }

    /// 取出登记超过 `ttl` 的条目
    fn sweep(&mut self, now: Instant, ttl: Duration) -> Vec<T> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, (registered, _))| now.saturating_duration_since(*registered) > ttl)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.take(&id))
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// RabbitMQ消息总线实现
///
/// 交换机均为direct类型；RPC回复走服务端命名的独占队列。
pub struct RabbitMQMessageBus {
    connection: Connection,
    pending: Mutex<PendingReplies<PendingReply>>,
}

impl RabbitMQMessageBus {
    pub async fn connect(url: &str) -> HerqlesResult<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| HerqlesError::transport(format!("连接RabbitMQ失败: {e}")))?;

        info!("成功连接到RabbitMQ");
        Ok(Self {
            connection,
            pending: Mutex::new(PendingReplies::new()),
        })
    }

    /// 打开启用了发布确认的通道
    async fn confirm_channel(&self) -> HerqlesResult<Channel> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| HerqlesError::transport(format!("创建通道失败: {e}")))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| HerqlesError::transport(format!("开启发布确认失败: {e}")))?;

        Ok(channel)
    }

    /// mandatory发布并等待broker确认，不可路由视为失败
    async fn publish_confirmed(
        channel: &Channel,
        exchange: &str,
        routing_key: &str,
        payload: &Value,
        properties: BasicProperties,
    ) -> HerqlesResult<()> {
        let body = serde_json::to_vec(payload)?;

        let confirm = channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: true,
                    ..Default::default()
                },
                &body,
                properties.with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| {
                HerqlesError::transport(format!("发布消息到 {exchange}/{routing_key} 失败: {e}"))
            })?;

        match confirm
            .await
            .map_err(|e| HerqlesError::transport(format!("消息发布确认失败: {e}")))?
        {
            Confirmation::Ack(None) | Confirmation::NotRequested => Ok(()),
            Confirmation::Ack(Some(_)) => Err(HerqlesError::transport(format!(
                "消息不可路由: {exchange}/{routing_key}"
            ))),
            Confirmation::Nack(_) => Err(HerqlesError::transport(format!(
                "broker拒绝消息: {exchange}/{routing_key}"
            ))),
        }
    }

    /// 在通道上声明独占回复队列并开始消费；回复无需确认
    async fn open_reply_queue(channel: &Channel) -> HerqlesResult<(String, Consumer)> {
        let reply_queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| HerqlesError::transport(format!("声明回复队列失败: {e}")))?;

        let consumer = channel
            .basic_consume(
                reply_queue.name().as_str(),
                "",
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| HerqlesError::transport(format!("创建回复消费者失败: {e}")))?;

        Ok((reply_queue.name().to_string(), consumer))
    }

    /// 关闭调用方放弃等待的回复通道
    async fn sweep_pending(&self) {
        let (expired, remaining) = {
            let mut pending = self.pending.lock().await;
            let expired = pending.sweep(Instant::now(), PENDING_TTL);
            (expired, pending.len())
        };
        if expired.is_empty() {
            return;
        }
        warn!(
            "清理 {} 个无人等待的RPC回复通道，仍在等待 {} 个",
            expired.len(),
            remaining
        );
        for reply in expired {
            Self::close_channel(&reply.channel).await;
        }
    }

    async fn close_channel(channel: &Channel) {
        if let Err(e) = channel.close(200, "done").await {
            debug!("关闭通道失败: {}", e);
        }
    }
}

#[async_trait]
impl MessageBus for RabbitMQMessageBus {
    async fn publish(&self, route: &Route, payload: &Value) -> HerqlesResult<String> {
        self.sweep_pending().await;
        let channel = self.confirm_channel().await?;

        let (reply_queue, consumer) = match Self::open_reply_queue(&channel).await {
            Ok(opened) => opened,
            Err(e) => {
                Self::close_channel(&channel).await;
                return Err(e);
            }
        };

        let correlation_id = Uuid::new_v4().to_string();
        let properties = BasicProperties::default()
            .with_correlation_id(correlation_id.clone().into())
            .with_reply_to(reply_queue.into());

        if let Err(e) = Self::publish_confirmed(
            &channel,
            &route.exchange,
            &route.routing_key,
            payload,
            properties,
        )
        .await
        {
            Self::close_channel(&channel).await;
            return Err(e);
        }

        self.pending.lock().await.insert(
            correlation_id.clone(),
            PendingReply { channel, consumer },
            Instant::now(),
        );

        debug!("RPC请求已发布: {} ({})", route, correlation_id);
        Ok(correlation_id)
    }

    async fn await_reply(
        &self,
        correlation_id: &str,
        timeout: Duration,
    ) -> HerqlesResult<Option<Value>> {
        let PendingReply {
            channel,
            mut consumer,
        } = self
            .pending
            .lock()
            .await
            .take(correlation_id)
            .ok_or_else(|| HerqlesError::internal(format!("未知的correlation id: {correlation_id}")))?;

        let wait = async {
            while let Some(delivery) = consumer.next().await {
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(e) => {
                        warn!("接收RPC回复失败: {}", e);
                        return None;
                    }
                };

                let matches = delivery
                    .properties
                    .correlation_id()
                    .as_ref()
                    .map(|id| id.as_str() == correlation_id)
                    .unwrap_or(false);
                if !matches {
                    debug!("忽略不匹配的RPC回复");
                    continue;
                }

                match serde_json::from_slice::<Value>(&delivery.data) {
                    Ok(value) => return Some(value),
                    Err(e) => {
                        warn!("RPC回复不是有效的JSON: {}", e);
                        return None;
                    }
                }
            }
            None
        };

        let reply = tokio::time::timeout(timeout, wait).await.unwrap_or(None);
        Self::close_channel(&channel).await;

        if reply.is_none() {
            debug!("RPC等待超时或无回复: {}", correlation_id);
        }
        Ok(reply)
    }

    async fn reply_to(
        &self,
        destination: &str,
        correlation_id: &str,
        payload: &Value,
    ) -> HerqlesResult<()> {
        let channel = self.confirm_channel().await?;
        let properties =
            BasicProperties::default().with_correlation_id(correlation_id.to_string().into());

        let result = Self::publish_confirmed(&channel, "", destination, payload, properties).await;
        Self::close_channel(&channel).await;
        result
    }

    async fn send(&self, route: &Route, payload: &Value) -> HerqlesResult<()> {
        let channel = self.confirm_channel().await?;
        let properties = BasicProperties::default().with_delivery_mode(2);

        let result = Self::publish_confirmed(
            &channel,
            &route.exchange,
            &route.routing_key,
            payload,
            properties,
        )
        .await;
        Self::close_channel(&channel).await;

        debug!("消息已发送到: {}", route);
        result
    }

    async fn subscribe(&self, binding: &Binding) -> HerqlesResult<DeliveryStream> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| HerqlesError::transport(format!("创建通道失败: {e}")))?;

        channel
            .basic_qos(binding.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| HerqlesError::transport(format!("设置prefetch失败: {e}")))?;

        channel
            .exchange_declare(
                &binding.route.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                HerqlesError::transport(format!("声明交换机 {} 失败: {e}", binding.route.exchange))
            })?;

        channel
            .queue_declare(
                &binding.queue,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| HerqlesError::transport(format!("声明队列 {} 失败: {e}", binding.queue)))?;

        channel
            .queue_bind(
                &binding.queue,
                &binding.route.exchange,
                &binding.route.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| HerqlesError::transport(format!("绑定队列 {} 失败: {e}", binding.queue)))?;

        let consumer = channel
            .basic_consume(
                &binding.queue,
                &format!("herqles-{}", binding.queue),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| HerqlesError::transport(format!("创建消费者失败: {e}")))?;

        info!("订阅队列 {} <- {}", binding.queue, binding.route);

        // 通道随流一起存活
        let stream = futures::stream::unfold((channel, consumer), |(channel, mut consumer)| async move {
            let next = consumer.next().await?;
            let item = next
                .map(|delivery| {
                    let reply_to = delivery.properties.reply_to().as_ref().map(|s| s.to_string());
                    let correlation_id = delivery
                        .properties
                        .correlation_id()
                        .as_ref()
                        .map(|s| s.to_string());
                    Delivery::new(
                        delivery.data,
                        reply_to,
                        correlation_id,
                        Arc::new(LapinAcknowledger {
                            acker: delivery.acker,
                        }),
                    )
                })
                .map_err(|e| HerqlesError::transport(format!("接收消息失败: {e}")));
            Some((item, (channel, consumer)))
        });

        Ok(stream.boxed())
    }

    async fn health_check(&self) -> HerqlesResult<()> {
        if self.connection.status().connected() {
            Ok(())
        } else {
            Err(HerqlesError::transport("RabbitMQ连接已断开"))
        }
    }

    async fn close(&self) -> HerqlesResult<()> {
        self.connection
            .close(200, "正常关闭")
            .await
            .map_err(|e| HerqlesError::transport(format!("关闭连接失败: {e}")))?;

        info!("RabbitMQ连接已关闭");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "rabbitmq"
    }
}

struct LapinAcknowledger {
    acker: lapin::acker::Acker,
}

#[async_trait]
impl Acknowledger for LapinAcknowledger {
    async fn ack(&self) -> HerqlesResult<()> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| HerqlesError::transport(format!("确认消息失败: {e}")))
    }

    async fn reject(&self, requeue: bool) -> HerqlesResult<()> {
        self.acker
            .reject(BasicRejectOptions { requeue })
            .await
            .map(|_| ())
            .map_err(|e| HerqlesError::transport(format!("拒绝消息失败: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_replies_take_once() {
        let mut pending = PendingReplies::new();
        let now = Instant::now();
        pending.insert("a".to_string(), 1, now);

        assert_eq!(pending.take("a"), Some(1));
        assert_eq!(pending.take("a"), None);
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_sweep_drops_abandoned_entries_only() {
        let mut pending = PendingReplies::new();
        let start = Instant::now();
        pending.insert("abandoned".to_string(), 1, start);
        pending.insert("fresh".to_string(), 2, start + Duration::from_secs(50));

        let later = start + Duration::from_secs(61);
        assert_eq!(pending.sweep(later, PENDING_TTL), vec![1]);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.take("fresh"), Some(2));
    }
}
