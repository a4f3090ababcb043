use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form worker / job target tags
pub type Tags = serde_json::Map<String, serde_json::Value>;

/// 执行节点
///
/// `(target, framework)` 在未删除的记录中唯一。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: i64,
    pub target: String,
    pub framework: String,
    pub datacenter: String,
    pub tags: Tags,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration request as announced by a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub target: String,
    pub framework: String,
    pub datacenter: String,
    #[serde(default)]
    pub tags: Tags,
}

/// Equality filters for listing workers; `None` leaves a column unconstrained
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WorkerFilter {
    pub framework: Option<String>,
    pub target: Option<String>,
    pub datacenter: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

impl WorkerFilter {
    pub fn framework_in_datacenter(framework: &str, datacenter: &str) -> Self {
        Self {
            framework: Some(framework.to_string()),
            datacenter: Some(datacenter.to_string()),
            ..Default::default()
        }
    }
}
