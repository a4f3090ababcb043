use serde::{Deserialize, Serialize};

use crate::errors::{HerqlesError, HerqlesResult};

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://herqles.db?mode=rwc".to_string(),
            max_connections: 20,
            connection_timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    /// Validate database configuration
    pub fn validate(&self) -> HerqlesResult<()> {
        if self.url.is_empty() {
            return Err(HerqlesError::configuration("数据库URL不能为空"));
        }

        if !self.url.starts_with("sqlite:") {
            return Err(HerqlesError::configuration("数据库URL必须是SQLite格式"));
        }

        if self.max_connections == 0 {
            return Err(HerqlesError::configuration("最大连接数必须大于0"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(HerqlesError::configuration("连接超时时间必须大于0"));
        }

        Ok(())
    }
}
