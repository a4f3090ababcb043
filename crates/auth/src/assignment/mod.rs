//! 授权后端：用户授权记录、权限与令牌

mod directory;
mod sql;

pub use directory::{relative_group_name, DirectoryAssignmentBackend};
pub use sql::SqlAssignmentBackend;

use async_trait::async_trait;
use herqles_core::{
    models::{IssuedToken, Principal},
    HerqlesError, HerqlesResult,
};

use crate::permission;
use crate::token::TokenManager;

#[async_trait]
pub trait AssignmentBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn tokens(&self) -> &TokenManager;

    /// 不受权限检查约束的管理员
    fn admin_username(&self) -> Option<&str>;

    async fn has_assignment(&self, username: &str) -> HerqlesResult<bool>;

    async fn create_assignment(&self, username: &str) -> HerqlesResult<()>;

    async fn delete_assignment(&self, username: &str) -> HerqlesResult<bool>;

    async fn assignment_id(&self, username: &str) -> HerqlesResult<Option<i64>>;

    async fn permissions(&self, username: &str) -> HerqlesResult<Vec<String>>;

    async fn add_permission(&self, username: &str, permission: &str) -> HerqlesResult<()>;

    async fn remove_permission(&self, username: &str, permission: &str) -> HerqlesResult<()>;

    fn is_admin(&self, username: &str) -> bool {
        self.admin_username()
            .map(|admin| admin == username)
            .unwrap_or(false)
    }

    async fn has_permission(
        &self,
        username: &str,
        required: &str,
        exact: bool,
    ) -> HerqlesResult<bool> {
        if self.is_admin(username) {
            return Ok(true);
        }
        let grants = self.permissions(username).await?;
        Ok(permission::any_matches(
            grants.iter().map(String::as_str),
            required,
            exact,
        ))
    }

    async fn issue_token(&self, username: &str, force: bool) -> HerqlesResult<IssuedToken>;

    async fn validate_token(&self, token: &str) -> HerqlesResult<Option<Principal>> {
        self.tokens().validate(token).await
    }

    async fn username_for_token(&self, token: &str) -> HerqlesResult<Option<String>> {
        Ok(self.validate_token(token).await?.map(|principal| principal.name))
    }
}

pub(crate) fn user_not_found(username: &str) -> HerqlesError {
    HerqlesError::UserNotFound {
        username: username.to_string(),
    }
}
