use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{HerqlesError, HerqlesResult};

/// Identity backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub driver: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            driver: "sql".to_string(),
        }
    }
}

/// Assignment (authorization) backend selection and settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    pub driver: String,
    /// Principal that bypasses every permission check
    pub admin_username: Option<String>,
    pub token_window_hours: u64,
    /// Directory group (relative to `base_dn`) to granted permissions
    pub mapping: HashMap<String, Vec<String>>,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            driver: "sql".to_string(),
            admin_username: Some("admin".to_string()),
            token_window_hours: 3,
            mapping: HashMap::new(),
        }
    }
}

impl AssignmentConfig {
    pub fn validate(&self) -> HerqlesResult<()> {
        if self.driver.is_empty() {
            return Err(HerqlesError::configuration("授权驱动名称不能为空"));
        }

        if self.driver == "sql"
            && self
                .admin_username
                .as_deref()
                .map(str::is_empty)
                .unwrap_or(true)
        {
            return Err(HerqlesError::configuration("sql授权驱动必须配置admin_username"));
        }

        if self.token_window_hours == 0 {
            return Err(HerqlesError::configuration("令牌有效期必须大于0"));
        }

        Ok(())
    }

    pub fn token_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_window_hours as i64)
    }
}

/// Directory service connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// e.g. `ldap://dc1.example.com:389`
    pub url: String,
    pub domain: String,
    pub base_dn: String,
    pub bind_username: String,
    pub bind_password: String,
}

impl LdapConfig {
    pub fn validate(&self) -> HerqlesResult<()> {
        if self.url.is_empty() {
            return Err(HerqlesError::configuration("LDAP URL不能为空"));
        }
        if !self.url.starts_with("ldap://") && !self.url.starts_with("ldaps://") {
            return Err(HerqlesError::configuration("LDAP URL必须以ldap://或ldaps://开头"));
        }
        if self.domain.is_empty() {
            return Err(HerqlesError::configuration("LDAP域名不能为空"));
        }
        if self.base_dn.is_empty() {
            return Err(HerqlesError::configuration("LDAP base_dn不能为空"));
        }
        if self.bind_username.is_empty() {
            return Err(HerqlesError::configuration("LDAP绑定用户不能为空"));
        }
        Ok(())
    }

    /// `user@domain` form used for simple binds
    pub fn principal(&self, username: &str) -> String {
        format!("{}@{}", username, self.domain)
    }
}
