use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::HerqlesError;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Lost,
    Starting,
    Running,
    Finished,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Lost => "LOST",
            TaskStatus::Starting => "STARTING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Finished => "FINISHED",
            TaskStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Failed)
    }

    /// 只有待执行或丢失的任务可以被启动
    pub fn can_launch(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Lost)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = HerqlesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "LOST" => Ok(TaskStatus::Lost),
            "STARTING" => Ok(TaskStatus::Starting),
            "RUNNING" => Ok(TaskStatus::Running),
            "FINISHED" => Ok(TaskStatus::Finished),
            "FAILED" => Ok(TaskStatus::Failed),
            _ => Err(HerqlesError::validation(format!("无效的任务状态: {s}"))),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for TaskStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<TaskStatus>().map_err(|e| e.to_string().into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// Opaque work descriptor run by the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub processor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub job_target_id: i64,
    pub name: String,
    pub status: TaskStatus,
    pub error_message: Option<String>,
    pub actions: Vec<Action>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
}

/// Task listing query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskFilter {
    pub job_id: Option<i64>,
    /// 1-based page number
    pub page: i64,
}

impl TaskFilter {
    pub const PER_PAGE: i64 = 20;

    pub fn offset(&self) -> i64 {
        (self.page - 1) * Self::PER_PAGE
    }
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self {
            job_id: None,
            page: 1,
        }
    }
}
