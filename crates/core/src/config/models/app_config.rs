use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    auth::{AssignmentConfig, IdentityConfig, LdapConfig},
    database::DatabaseConfig,
    message_queue::MessageQueueConfig,
};
use crate::errors::{HerqlesError, HerqlesResult};

/// Manager configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub message_queue: MessageQueueConfig,
    pub api: ApiConfig,
    pub identity: IdentityConfig,
    pub assignment: AssignmentConfig,
    pub ldap: Option<LdapConfig>,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Built-in defaults
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (`HERQLES_<SECTION>__<KEY>`)
    pub fn load(config_path: Option<&str>) -> HerqlesResult<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(HerqlesError::configuration(format!("配置文件不存在: {path}")));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let default_paths = ["config/herqles.toml", "herqles.toml", "/etc/herqles/manager.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("HERQLES")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .map_err(|e| HerqlesError::configuration(format!("构建配置失败: {e}")))?
            .try_deserialize()
            .map_err(|e| HerqlesError::configuration(format!("反序列化配置失败: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> HerqlesResult<Self> {
        let config: AppConfig = toml::from_str(toml_str)
            .map_err(|e| HerqlesError::configuration(format!("解析TOML配置失败: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> HerqlesResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| HerqlesError::configuration(format!("序列化配置为TOML失败: {e}")))
    }

    /// Validate every section plus the cross-section requirements
    pub fn validate(&self) -> HerqlesResult<()> {
        self.database.validate()?;
        self.message_queue.validate()?;
        self.api.validate()?;
        self.assignment.validate()?;
        self.observability.validate()?;

        if self.identity.driver.is_empty() {
            return Err(HerqlesError::configuration("身份驱动名称不能为空"));
        }

        let needs_ldap = self.identity.driver == "ldap" || self.assignment.driver == "ldap";
        match &self.ldap {
            Some(ldap) => ldap.validate()?,
            None if needs_ldap => {
                return Err(HerqlesError::configuration("ldap驱动需要配置[ldap]段"));
            }
            None => {}
        }

        Ok(())
    }
}
