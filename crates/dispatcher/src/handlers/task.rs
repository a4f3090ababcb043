use async_trait::async_trait;
use herqles_core::{
    models::{TaskLaunchReply, TaskLaunchRequest, TaskStatusReport},
    traits::{Binding, Delivery},
    HerqlesResult,
};
use serde_json::Value;
use tracing::debug;

use super::{TASK_LAUNCH_QUEUE, TASK_STATUS_QUEUE};
use crate::subscriber::MessageHandler;
use crate::task_dispatcher::{ReportOutcome, TaskDispatcher};

pub struct LaunchTaskHandler {
    dispatcher: TaskDispatcher,
}

impl LaunchTaskHandler {
    pub fn new(dispatcher: TaskDispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl MessageHandler for LaunchTaskHandler {
    fn binding(&self) -> Binding {
        Binding::new("task", "launch", TASK_LAUNCH_QUEUE)
    }

    async fn handle(&self, delivery: &Delivery) -> HerqlesResult<Option<Value>> {
        let request: TaskLaunchRequest = delivery.json()?;
        let status = self
            .dispatcher
            .launch(request.task_id, request.worker_id)
            .await?;
        Ok(Some(serde_json::to_value(TaskLaunchReply { status, code: 200 })?))
    }
}

/// 状态上报只确认不回复；非法上报也确认，避免反复投递
pub struct TaskStatusHandler {
    dispatcher: TaskDispatcher,
}

impl TaskStatusHandler {
    pub fn new(dispatcher: TaskDispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl MessageHandler for TaskStatusHandler {
    fn binding(&self) -> Binding {
        Binding::new("task", "task_status", TASK_STATUS_QUEUE)
    }

    async fn handle(&self, delivery: &Delivery) -> HerqlesResult<Option<Value>> {
        let report: TaskStatusReport = delivery.json()?;
        let outcome = self.dispatcher.report_status(&report).await?;
        if !matches!(outcome, ReportOutcome::Applied(_)) {
            debug!("任务 {} 的状态上报未生效: {:?}", report.task_id, outcome);
        }
        Ok(None)
    }
}
