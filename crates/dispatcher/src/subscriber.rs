//! 总线订阅运行器
//!
//! 每个订阅一个独立任务；同一订阅内消息严格串行(prefetch = 1)。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use herqles_core::{
    models::ErrorReply,
    traits::{Binding, Delivery, DeliveryStream, MessageBus},
    HerqlesError, HerqlesResult,
};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 服务端故障后重投前的等待，避免同一条消息热循环
const REQUEUE_DELAY: Duration = Duration::from_millis(200);

/// 一个订阅的消息处理器
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn binding(&self) -> Binding;

    /// 返回需要回复给请求方的载荷；`None` 表示只确认
    async fn handle(&self, delivery: &Delivery) -> HerqlesResult<Option<Value>>;
}

struct RunningSubscription {
    queue: String,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// 已启动的订阅集合
pub struct SubscriberSet {
    bus: Arc<dyn MessageBus>,
    running: Vec<RunningSubscription>,
}

impl SubscriberSet {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            bus,
            running: Vec::new(),
        }
    }

    pub async fn start(&mut self, handler: Arc<dyn MessageHandler>) -> HerqlesResult<()> {
        let binding = handler.binding();
        let stream = self.bus.subscribe(&binding).await?;
        let (stop, stopped) = oneshot::channel();

        let task = tokio::spawn(run_subscription(
            self.bus.clone(),
            handler,
            binding.queue.clone(),
            stream,
            stopped,
        ));

        self.running.push(RunningSubscription {
            queue: binding.queue,
            stop,
            task,
        });
        Ok(())
    }

    pub async fn start_all(&mut self, handlers: Vec<Arc<dyn MessageHandler>>) -> HerqlesResult<()> {
        for handler in handlers {
            self.start(handler).await?;
        }
        info!("已启动 {} 个订阅", self.running.len());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    /// 逐个停止订阅；正在处理的消息会先处理完
    pub async fn stop_all(self) {
        for subscription in self.running {
            let _ = subscription.stop.send(());
            if let Err(e) = subscription.task.await {
                error!("订阅任务 {} 异常退出: {}", subscription.queue, e);
            }
            debug!("订阅已停止: {}", subscription.queue);
        }
        info!("所有订阅已停止");
    }
}

async fn run_subscription(
    bus: Arc<dyn MessageBus>,
    handler: Arc<dyn MessageHandler>,
    queue: String,
    mut stream: DeliveryStream,
    mut stopped: oneshot::Receiver<()>,
) {
    info!("开始消费队列: {}", queue);

    loop {
        tokio::select! {
            _ = &mut stopped => {
                info!("收到停止信号，退出队列 {} 的消费", queue);
                break;
            }
            next = stream.next() => match next {
                Some(Ok(delivery)) => process(bus.as_ref(), handler.as_ref(), &queue, delivery).await,
                Some(Err(e)) => error!("从队列 {} 接收消息出错: {}", queue, e),
                None => {
                    warn!("队列 {} 的消息流已关闭", queue);
                    break;
                }
            }
        }
    }
}

async fn process(bus: &dyn MessageBus, handler: &dyn MessageHandler, queue: &str, delivery: Delivery) {
    let outcome = match handler.handle(&delivery).await {
        Ok(reply) => {
            if let Some(reply) = reply {
                respond(bus, &delivery, &reply).await;
            }
            "ok"
        }
        Err(e @ HerqlesError::MalformedMessage(_)) => {
            warn!("队列 {} 收到无法解析的消息，已丢弃: {}", queue, e);
            respond(bus, &delivery, &error_payload(&e)).await;
            if let Err(e) = delivery.reject(false).await {
                error!("拒绝消息失败: {}", e);
            }
            count(queue, "rejected");
            return;
        }
        // 没有回复地址的消息没人会重试，交回broker重投
        Err(e) if e.is_server_error() && delivery.reply_to.is_none() => {
            error!("队列 {} 的消息处理失败，稍后重投: {}", queue, e);
            tokio::time::sleep(REQUEUE_DELAY).await;
            if let Err(e) = delivery.reject(true).await {
                error!("重投消息失败: {}", e);
            }
            count(queue, "requeued");
            return;
        }
        // RPC请求的故障回复给调用方，由调用方决定是否重试
        Err(e) => {
            if e.is_server_error() {
                error!("队列 {} 的消息处理失败: {}", queue, e);
            } else {
                warn!("队列 {} 的请求被拒绝: {}", queue, e);
            }
            respond(bus, &delivery, &error_payload(&e)).await;
            "error"
        }
    };

    if let Err(e) = delivery.ack().await {
        error!("确认消息失败: {}", e);
    }
    count(queue, outcome);
}

/// 只有带reply_to和correlation id的请求才需要回复
async fn respond(bus: &dyn MessageBus, delivery: &Delivery, payload: &Value) {
    let (Some(reply_to), Some(correlation_id)) = (&delivery.reply_to, &delivery.correlation_id)
    else {
        return;
    };

    if let Err(e) = bus.reply_to(reply_to, correlation_id, payload).await {
        warn!("回复 {} 失败: {}", reply_to, e);
    }
}

fn error_payload(error: &HerqlesError) -> Value {
    serde_json::to_value(ErrorReply::from(error)).unwrap_or(Value::Null)
}

fn count(queue: &str, outcome: &'static str) {
    metrics::counter!(
        "herqles_bus_messages_total",
        "queue" => queue.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
