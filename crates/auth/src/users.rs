//! 用户管理操作

use std::sync::Arc;

use herqles_core::{
    models::{IssuedToken, Principal},
    HerqlesError, HerqlesResult,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::assignment::{user_not_found, AssignmentBackend};
use crate::drivers::AuthBackends;
use crate::identity::IdentityBackend;
use crate::permission::validate_permission;
use crate::service::AuthorizationService;

pub const PERMISSION_USER_ADD: &str = "herqles.user.add";
pub const PERMISSION_USER_GET: &str = "herqles.user.get";
pub const PERMISSION_USER_DELETE: &str = "herqles.user.delete";
pub const PERMISSION_USER_PASSWORD: &str = "herqles.user.password";
pub const PERMISSION_ADD: &str = "herqles.user.permission.add";
pub const PERMISSION_DELETE: &str = "herqles.user.permission.delete";

/// 创建/删除用户时每个后端是否实际发生变更
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserChange {
    pub username: String,
    pub identity: bool,
    pub assignment: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    pub username: String,
    pub permissions: Vec<String>,
}

#[derive(Clone)]
pub struct UserService {
    identity: Arc<dyn IdentityBackend>,
    assignment: Arc<dyn AssignmentBackend>,
    authorization: AuthorizationService,
}

impl UserService {
    pub fn new(backends: &AuthBackends) -> Self {
        Self {
            identity: backends.identity.clone(),
            assignment: backends.assignment.clone(),
            authorization: AuthorizationService::new(backends.assignment.clone()),
        }
    }

    pub fn authorization(&self) -> &AuthorizationService {
        &self.authorization
    }

    pub async fn add_user(
        &self,
        caller: &Principal,
        username: &str,
        password: &str,
    ) -> HerqlesResult<UserChange> {
        self.authorization.require(caller, PERMISSION_USER_ADD).await?;
        require_non_empty("username", username)?;
        require_non_empty("password", password)?;

        let identity = self.identity.create_user(username, password).await?;

        let assignment = if self.assignment.assignment_id(username).await?.is_none() {
            self.assignment.create_assignment(username).await?;
            self.assignment.assignment_id(username).await?.is_some()
        } else {
            false
        };

        info!("添加用户 {} (identity={}, assignment={})", username, identity, assignment);
        Ok(UserChange {
            username: username.to_string(),
            identity,
            assignment,
        })
    }

    pub async fn get_user(&self, caller: &Principal, username: &str) -> HerqlesResult<UserDetails> {
        self.authorization
            .require_self_or(caller, username, PERMISSION_USER_GET)
            .await?;

        if !self.assignment.has_assignment(username).await? {
            return Err(user_not_found(username));
        }

        Ok(UserDetails {
            username: username.to_string(),
            permissions: self.assignment.permissions(username).await?,
        })
    }

    /// 分别删除身份和授权记录；两者都不存在时返回 `UserNotFound`
    pub async fn delete_user(&self, caller: &Principal, username: &str) -> HerqlesResult<UserChange> {
        self.authorization.require(caller, PERMISSION_USER_DELETE).await?;
        require_non_empty("username", username)?;

        let identity = self.identity.user_exists(username).await?
            && self.identity.delete_user(username).await?;
        let assignment = self.assignment.assignment_id(username).await?.is_some()
            && self.assignment.delete_assignment(username).await?;

        if !identity && !assignment {
            return Err(user_not_found(username));
        }

        info!("删除用户 {} (identity={}, assignment={})", username, identity, assignment);
        Ok(UserChange {
            username: username.to_string(),
            identity,
            assignment,
        })
    }

    /// 以用户名和密码换取令牌，不需要已有令牌
    pub async fn issue_token(&self, username: &str, password: &str) -> HerqlesResult<IssuedToken> {
        require_non_empty("username", username)?;
        require_non_empty("password", password)?;

        if !self.identity.authenticate(username, password).await? {
            return Err(HerqlesError::InvalidCredentials);
        }
        if !self.assignment.has_assignment(username).await? {
            return Err(user_not_found(username));
        }

        self.assignment.issue_token(username, false).await
    }

    /// 修改密码并强制轮换令牌
    pub async fn change_password(
        &self,
        caller: &Principal,
        username: &str,
        password: &str,
    ) -> HerqlesResult<IssuedToken> {
        self.authorization
            .require_self_or(caller, username, PERMISSION_USER_PASSWORD)
            .await?;
        require_non_empty("password", password)?;

        if !self.assignment.has_assignment(username).await? {
            return Err(user_not_found(username));
        }

        self.identity.change_password(username, password).await?;
        info!("用户密码已修改: {}", username);
        self.assignment.issue_token(username, true).await
    }

    pub async fn add_permission(
        &self,
        caller: &Principal,
        username: &str,
        permission: &str,
    ) -> HerqlesResult<()> {
        self.authorization.require(caller, PERMISSION_ADD).await?;
        validate_permission(permission)?;

        if !self.assignment.has_assignment(username).await? {
            return Err(user_not_found(username));
        }
        if self.assignment.has_permission(username, permission, false).await? {
            return Err(HerqlesError::state_conflict(format!(
                "用户 {username} 已拥有权限 {permission}"
            )));
        }

        self.assignment.add_permission(username, permission).await
    }

    /// 只能撤销按字面持有的权限，通配授予不算
    pub async fn remove_permission(
        &self,
        caller: &Principal,
        username: &str,
        permission: &str,
    ) -> HerqlesResult<()> {
        self.authorization.require(caller, PERMISSION_DELETE).await?;
        validate_permission(permission)?;

        if !self.assignment.has_assignment(username).await? {
            return Err(user_not_found(username));
        }
        if !self.assignment.has_permission(username, permission, true).await? {
            return Err(HerqlesError::state_conflict(format!(
                "用户 {username} 未持有权限 {permission}"
            )));
        }

        self.assignment.remove_permission(username, permission).await
    }
}

fn require_non_empty(field: &str, value: &str) -> HerqlesResult<()> {
    if value.trim().is_empty() {
        return Err(HerqlesError::validation(format!("{field} 不能为空")));
    }
    Ok(())
}
