use std::sync::Arc;

use async_trait::async_trait;
use herqles_core::{
    models::IssuedToken, traits::AssignmentRepository, HerqlesError, HerqlesResult,
};
use tracing::{debug, info};

use super::{user_not_found, AssignmentBackend};
use crate::token::TokenManager;

/// 权限保存在数据库中的授权后端
pub struct SqlAssignmentBackend {
    assignments: Arc<dyn AssignmentRepository>,
    tokens: TokenManager,
    admin_username: String,
}

impl SqlAssignmentBackend {
    pub fn new(
        assignments: Arc<dyn AssignmentRepository>,
        tokens: TokenManager,
        admin_username: impl Into<String>,
    ) -> Self {
        Self {
            assignments,
            tokens,
            admin_username: admin_username.into(),
        }
    }

    /// 确保管理员拥有授权记录
    pub async fn bootstrap(&self) -> HerqlesResult<()> {
        if self
            .assignments
            .find_by_username(&self.admin_username)
            .await?
            .is_none()
        {
            self.assignments.create(&self.admin_username).await?;
            info!("已创建管理员授权记录: {}", self.admin_username);
        }
        Ok(())
    }

    async fn require_id(&self, username: &str) -> HerqlesResult<i64> {
        self.assignment_id(username)
            .await?
            .ok_or_else(|| user_not_found(username))
    }
}

#[async_trait]
impl AssignmentBackend for SqlAssignmentBackend {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    fn admin_username(&self) -> Option<&str> {
        Some(&self.admin_username)
    }

    async fn has_assignment(&self, username: &str) -> HerqlesResult<bool> {
        Ok(self.assignments.find_by_username(username).await?.is_some())
    }

    async fn create_assignment(&self, username: &str) -> HerqlesResult<()> {
        self.assignments.create(username).await?;
        Ok(())
    }

    async fn delete_assignment(&self, username: &str) -> HerqlesResult<bool> {
        self.assignments.delete(username).await
    }

    async fn assignment_id(&self, username: &str) -> HerqlesResult<Option<i64>> {
        Ok(self
            .assignments
            .find_by_username(username)
            .await?
            .map(|assignment| assignment.id))
    }

    async fn permissions(&self, username: &str) -> HerqlesResult<Vec<String>> {
        match self.assignment_id(username).await? {
            Some(id) => self.assignments.list_permissions(id).await,
            None => Ok(Vec::new()),
        }
    }

    async fn add_permission(&self, username: &str, permission: &str) -> HerqlesResult<()> {
        let id = self.require_id(username).await?;
        self.assignments.add_permission(id, permission).await?;
        debug!("授予权限 {} -> {}", permission, username);
        Ok(())
    }

    async fn remove_permission(&self, username: &str, permission: &str) -> HerqlesResult<()> {
        let id = self.require_id(username).await?;
        if !self.assignments.remove_permission(id, permission).await? {
            return Err(HerqlesError::state_conflict(format!(
                "用户 {username} 没有可撤销的权限记录 {permission}"
            )));
        }
        debug!("撤销权限 {} <- {}", permission, username);
        Ok(())
    }

    async fn issue_token(&self, username: &str, force: bool) -> HerqlesResult<IssuedToken> {
        let assignment = self
            .assignments
            .find_by_username(username)
            .await?
            .ok_or_else(|| user_not_found(username))?;
        self.tokens.issue(&assignment, force).await
    }
}
