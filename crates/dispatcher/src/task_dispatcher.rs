use std::sync::Arc;

use chrono::Utc;
use herqles_core::{
    models::{RunCommand, Task, TaskStatus, TaskStatusReport, Worker},
    traits::{MessageBus, Route, StatusChange, TaskRepository, WorkerRepository},
    HerqlesError, HerqlesResult, ServiceContext,
};
use herqles_infrastructure::RpcClient;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::state_machine::{next_status, stops_task};

/// 状态上报的处理结果，三种情况都会确认消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Applied(TaskStatus),
    Rejected { current: TaskStatus, reported: String },
    UnknownTask,
}

/// 任务启动与状态上报
#[derive(Clone)]
pub struct TaskDispatcher {
    tasks: Arc<dyn TaskRepository>,
    workers: Arc<dyn WorkerRepository>,
    bus: Arc<dyn MessageBus>,
    rpc: RpcClient,
}

impl TaskDispatcher {
    pub fn new(ctx: &ServiceContext) -> Self {
        Self {
            tasks: ctx.tasks.clone(),
            workers: ctx.workers.clone(),
            bus: ctx.bus.clone(),
            rpc: RpcClient::new(ctx.bus.clone(), ctx.rpc_timeout),
        }
    }

    /// 启动任务：探测Worker存活，状态CAS到STARTING，再下发运行指令
    ///
    /// 两个并发启动只有一个能通过CAS；另一个得到状态冲突。
    pub async fn launch(&self, task_id: i64, worker_id: i64) -> HerqlesResult<TaskStatus> {
        let result = self.try_launch(task_id, worker_id).await;
        let outcome = match &result {
            Ok(_) => "started",
            Err(HerqlesError::StateConflict(_)) => "conflict",
            Err(HerqlesError::Transport(_) | HerqlesError::ReplyTimeout(_)) => "unreachable",
            Err(e) if e.code() == 404 => "not_found",
            Err(_) => "error",
        };
        metrics::counter!("herqles_task_launch_total", "outcome" => outcome).increment(1);
        result
    }

    async fn try_launch(&self, task_id: i64, worker_id: i64) -> HerqlesResult<TaskStatus> {
        let task = self
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or(HerqlesError::TaskNotFound { id: task_id })?;

        if !task.status.can_launch() {
            return Err(HerqlesError::state_conflict(format!(
                "任务 {} 当前状态为 {}，无法启动",
                task_id, task.status
            )));
        }

        let worker = self
            .workers
            .find_active(worker_id)
            .await?
            .ok_or(HerqlesError::WorkerNotFound { id: worker_id })?;

        self.probe(&worker).await?;

        let previous = task.status;
        if !self
            .tasks
            .compare_and_set_status(task_id, previous, &StatusChange::to(TaskStatus::Starting))
            .await?
        {
            return Err(HerqlesError::state_conflict(format!(
                "任务 {task_id} 已被并发启动"
            )));
        }

        if let Err(e) = self.send_run_command(&task, &worker).await {
            self.restore(task_id, previous).await;
            return Err(e);
        }

        info!(
            "任务 {} 已下发到Worker {} ({}/{})",
            task_id, worker.id, worker.target, worker.framework
        );
        Ok(TaskStatus::Starting)
    }

    /// 任何非空回复都表示Worker存活
    async fn probe(&self, worker: &Worker) -> HerqlesResult<()> {
        let route = Route::worker_alive(&worker.target, &worker.framework);
        let reply = self.rpc.call(&route, &json!({})).await.map_err(|e| {
            warn!("Worker {} 存活探测失败: {}", worker.id, e);
            e
        })?;

        if is_empty_reply(&reply) {
            return Err(HerqlesError::transport(format!(
                "Worker {} 存活探测返回空回复",
                worker.id
            )));
        }
        debug!("Worker {} 存活", worker.id);
        Ok(())
    }

    async fn send_run_command(&self, task: &Task, worker: &Worker) -> HerqlesResult<()> {
        let command = serde_json::to_value(RunCommand::from(task))?;
        self.bus
            .send(&Route::worker_run(&worker.target, &worker.framework), &command)
            .await
    }

    /// 下发失败后把任务退回原状态，以便重试
    async fn restore(&self, task_id: i64, previous: TaskStatus) {
        match self
            .tasks
            .compare_and_set_status(task_id, TaskStatus::Starting, &StatusChange::to(previous))
            .await
        {
            Ok(true) => warn!("运行指令下发失败，任务 {} 已恢复为 {}", task_id, previous),
            Ok(false) => warn!("任务 {} 状态已变化，未恢复", task_id),
            Err(e) => error!("恢复任务 {} 状态失败: {}", task_id, e),
        }
    }

    /// 处理Worker上报的状态；非法转换只记录日志，不修改状态
    pub async fn report_status(&self, report: &TaskStatusReport) -> HerqlesResult<ReportOutcome> {
        let Some(task) = self.tasks.find_by_id(report.task_id).await? else {
            warn!("收到未知任务 {} 的状态上报", report.task_id);
            return Ok(ReportOutcome::UnknownTask);
        };

        let rejected = || ReportOutcome::Rejected {
            current: task.status,
            reported: report.status.clone(),
        };

        let Ok(reported) = report.status.parse::<TaskStatus>() else {
            warn!("任务 {} 上报了无效状态: {}", task.id, report.status);
            return Ok(rejected());
        };

        let Some(next) = next_status(task.status, reported) else {
            warn!(
                "任务 {} 的状态转换无效: {} -> {}",
                task.id, task.status, reported
            );
            return Ok(rejected());
        };

        let mut change = StatusChange::to(next);
        if stops_task(next) {
            change.stopped_at = Some(Utc::now());
        }
        if next == TaskStatus::Failed {
            change.error_message = report.message.clone();
        }

        if !self
            .tasks
            .compare_and_set_status(task.id, task.status, &change)
            .await?
        {
            warn!("任务 {} 状态已被并发修改，忽略上报 {}", task.id, reported);
            return Ok(rejected());
        }

        info!("任务 {} 状态更新: {} -> {}", task.id, task.status, next);
        Ok(ReportOutcome::Applied(next))
    }
}

fn is_empty_reply(reply: &Value) -> bool {
    match reply {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
