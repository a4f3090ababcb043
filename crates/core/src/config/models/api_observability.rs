use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::errors::{HerqlesError, HerqlesResult};

/// How the REST layer checks `X-Auth-Token`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenValidationMode {
    /// RPC call to `security.validate` on the bus
    #[default]
    Bus,
    /// In-process call to the authorization service
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub token_validation: TokenValidationMode,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
            token_validation: TokenValidationMode::Bus,
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> HerqlesResult<()> {
        if self.enabled && self.bind_address.parse::<SocketAddr>().is_err() {
            return Err(HerqlesError::configuration(format!(
                "无效的API绑定地址: {}",
                self.bind_address
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// `pretty` or `json`
    pub log_format: String,
    /// Prometheus exporter listen address, disabled when absent
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_address: None,
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> HerqlesResult<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(HerqlesError::configuration(format!(
                "无效的日志级别: {}",
                self.log_level
            )));
        }

        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            return Err(HerqlesError::configuration(format!(
                "不支持的日志格式: {}",
                self.log_format
            )));
        }

        if let Some(addr) = &self.metrics_address {
            if addr.parse::<SocketAddr>().is_err() {
                return Err(HerqlesError::configuration(format!("无效的指标监听地址: {addr}")));
            }
        }

        Ok(())
    }
}
