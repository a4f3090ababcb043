use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::task::{Action, TaskStatus};
use super::worker::Tags;
use crate::errors::HerqlesError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Running,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Finished => "FINISHED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = HerqlesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "FINISHED" => Ok(JobStatus::Finished),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(HerqlesError::validation(format!("无效的作业状态: {s}"))),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for JobStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<JobStatus>().map_err(|e| e.to_string().into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// Task summary nested in a job read projection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobTaskSummary {
    pub id: i64,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobTarget {
    pub id: i64,
    pub worker_id: i64,
    /// Target string of the linked worker
    pub target: String,
    pub tags: Option<Tags>,
    pub tasks: Vec<JobTaskSummary>,
}

/// 作业读取投影，包含目标及其任务
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: i64,
    pub name: String,
    pub status: JobStatus,
    pub datacenter: String,
    pub targets: Vec<JobTarget>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
}

/// Input for materializing a job against worker targets
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewJob {
    pub name: String,
    pub datacenter: String,
    pub targets: Vec<NewJobTarget>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewJobTarget {
    pub worker_id: i64,
    #[serde(default)]
    pub tags: Option<Tags>,
    pub tasks: Vec<NewTask>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub actions: Vec<Action>,
}
