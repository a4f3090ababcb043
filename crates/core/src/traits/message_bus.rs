use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{HerqlesError, HerqlesResult};

/// direct交换机上的目的地：交换机名加路由键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub exchange: String,
    pub routing_key: String,
}

impl Route {
    pub fn new(exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }

    /// 发送到Worker私有交换机的运行指令
    pub fn worker_run(target: &str, framework: &str) -> Self {
        Self::new(format!("worker-{target}"), format!("run-{framework}"))
    }

    /// Worker存活探测
    pub fn worker_alive(target: &str, framework: &str) -> Self {
        Self::new(format!("worker-{target}"), format!("alive-{framework}"))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.exchange, self.routing_key)
    }
}

/// 绑定到某个路由的持久队列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub route: Route,
    pub queue: String,
    pub prefetch: u16,
}

impl Binding {
    /// 每个订阅同一时刻只处理一条消息
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        queue: impl Into<String>,
    ) -> Self {
        Self {
            route: Route::new(exchange, routing_key),
            queue: queue.into(),
            prefetch: 1,
        }
    }
}

/// 向broker确认或拒绝一条入站消息
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> HerqlesResult<()>;
    async fn reject(&self, requeue: bool) -> HerqlesResult<()>;
}

/// 一条入站消息
pub struct Delivery {
    pub body: Vec<u8>,
    pub reply_to: Option<String>,
    pub correlation_id: Option<String>,
    acker: Arc<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        body: Vec<u8>,
        reply_to: Option<String>,
        correlation_id: Option<String>,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            body,
            reply_to,
            correlation_id,
            acker,
        }
    }

    /// 解析消息体；失败归为 `MalformedMessage`，订阅方据此丢弃而不是重投
    pub fn json<T: DeserializeOwned>(&self) -> HerqlesResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| HerqlesError::MalformedMessage(e.to_string()))
    }

    pub async fn ack(&self) -> HerqlesResult<()> {
        self.acker.ack().await
    }

    pub async fn reject(&self, requeue: bool) -> HerqlesResult<()> {
        self.acker.reject(requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("body", &String::from_utf8_lossy(&self.body))
            .field("reply_to", &self.reply_to)
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

pub type DeliveryStream = BoxStream<'static, HerqlesResult<Delivery>>;

/// 消息总线抽象接口
///
/// 在发布/订阅之上提供基于correlation id的请求/应答。
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// 发布RPC请求，返回correlation id；目的地不可路由时返回错误
    async fn publish(&self, route: &Route, payload: &Value) -> HerqlesResult<String>;

    /// 等待指定correlation id的回复；超时返回 `None`
    async fn await_reply(
        &self,
        correlation_id: &str,
        timeout: Duration,
    ) -> HerqlesResult<Option<Value>>;

    /// 回复一条入站请求
    async fn reply_to(
        &self,
        destination: &str,
        correlation_id: &str,
        payload: &Value,
    ) -> HerqlesResult<()>;

    /// 发布不需要回复的消息
    async fn send(&self, route: &Route, payload: &Value) -> HerqlesResult<()>;

    /// 绑定持久队列并开始消费
    async fn subscribe(&self, binding: &Binding) -> HerqlesResult<DeliveryStream>;

    async fn health_check(&self) -> HerqlesResult<()>;

    async fn close(&self) -> HerqlesResult<()>;

    fn backend_name(&self) -> &'static str;
}
