//! 总线消息载荷定义

use serde::{de, Deserialize, Deserializer, Serialize};

use super::assignment::Principal;
use super::task::{Action, Task, TaskStatus};
use super::worker::{Tags, Worker};
use crate::errors::HerqlesError;

/// 接受数字或数字字符串形式的ID
pub fn deserialize_flexible_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| de::Error::custom(format!("无效的ID: {text}"))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdReply {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReloadRequest {
    pub target: String,
    pub framework: String,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerGetRequest {
    pub framework: String,
    pub datacenter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub id: i64,
    pub target: String,
    pub framework: String,
    pub tags: Tags,
}

impl From<Worker> for WorkerSummary {
    fn from(worker: Worker) -> Self {
        Self {
            id: worker.id,
            target: worker.target,
            framework: worker.framework,
            tags: worker.tags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerGetReply {
    pub workers: Vec<WorkerSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLaunchRequest {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub task_id: i64,
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub worker_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLaunchReply {
    pub status: TaskStatus,
    pub code: u16,
}

/// Worker 上报的任务状态，状态字符串在处理时再校验
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusReport {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub task_id: i64,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAction {
    pub processor: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl From<&Action> for RunAction {
    fn from(action: &Action) -> Self {
        Self {
            processor: action.processor.clone(),
            arguments: action.arguments.clone().unwrap_or_default(),
        }
    }
}

/// 发送到 `worker-<target>` / `run-<framework>` 的运行指令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCommand {
    pub id: i64,
    pub name: String,
    pub actions: Vec<RunAction>,
}

impl From<&Task> for RunCommand {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            name: task.name.clone(),
            actions: task.actions.iter().map(RunAction::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateReply {
    pub code: u16,
    pub user: Principal,
}

/// 失败请求的 `{code, error}` 回复
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub code: u16,
    pub error: String,
}

impl From<&HerqlesError> for ErrorReply {
    fn from(err: &HerqlesError) -> Self {
        Self {
            code: err.code(),
            error: err.to_string(),
        }
    }
}
