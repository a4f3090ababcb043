//! REST响应投影，时间戳为毫秒

use chrono::{DateTime, Utc};
use herqles_core::models::{
    Action, Job, JobStatus, JobTarget, Tags, Task, TaskStatus, Worker,
};
use serde::Serialize;

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

#[derive(Debug, Serialize)]
pub struct TaskSummaryView {
    pub id: i64,
    pub status: TaskStatus,
}

#[derive(Debug, Serialize)]
pub struct JobTargetView {
    pub id: i64,
    pub worker_id: i64,
    pub target: String,
    pub tags: Option<Tags>,
    pub tasks: Vec<TaskSummaryView>,
}

impl From<JobTarget> for JobTargetView {
    fn from(target: JobTarget) -> Self {
        Self {
            id: target.id,
            worker_id: target.worker_id,
            target: target.target,
            tags: target.tags,
            tasks: target
                .tasks
                .into_iter()
                .map(|task| TaskSummaryView {
                    id: task.id,
                    status: task.status,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: i64,
    pub name: String,
    pub status: JobStatus,
    pub datacenter: String,
    pub targets: Vec<JobTargetView>,
    pub created_at: i64,
    pub updated_at: i64,
    pub stopped_at: Option<i64>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            name: job.name,
            status: job.status,
            datacenter: job.datacenter,
            targets: job.targets.into_iter().map(JobTargetView::from).collect(),
            created_at: millis(job.created_at),
            updated_at: millis(job.updated_at),
            stopped_at: job.stopped_at.map(millis),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskView {
    pub id: i64,
    pub job_target_id: i64,
    pub name: String,
    pub status: TaskStatus,
    pub error_message: Option<String>,
    pub actions: Vec<Action>,
    pub created_at: i64,
    pub updated_at: i64,
    pub stopped_at: Option<i64>,
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            job_target_id: task.job_target_id,
            name: task.name,
            status: task.status,
            error_message: task.error_message,
            actions: task.actions,
            created_at: millis(task.created_at),
            updated_at: millis(task.updated_at),
            stopped_at: task.stopped_at.map(millis),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WorkerView {
    pub id: i64,
    pub target: String,
    pub framework: String,
    pub datacenter: String,
    pub tags: Tags,
    pub deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl From<Worker> for WorkerView {
    fn from(worker: Worker) -> Self {
        Self {
            id: worker.id,
            target: worker.target,
            framework: worker.framework,
            datacenter: worker.datacenter,
            tags: worker.tags,
            deleted: worker.deleted,
            created_at: millis(worker.created_at),
            updated_at: millis(worker.updated_at),
            deleted_at: worker.deleted_at.map(millis),
        }
    }
}
