use std::sync::Arc;

use async_trait::async_trait;
use herqles_core::{traits::DirectoryService, HerqlesResult};
use tracing::debug;

use super::IdentityBackend;

/// 以目录服务为准的身份后端，本地不保存也不修改任何身份
pub struct DirectoryIdentityBackend {
    directory: Arc<dyn DirectoryService>,
}

impl DirectoryIdentityBackend {
    pub fn new(directory: Arc<dyn DirectoryService>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl IdentityBackend for DirectoryIdentityBackend {
    fn name(&self) -> &'static str {
        "ldap"
    }

    async fn user_exists(&self, username: &str) -> HerqlesResult<bool> {
        Ok(self.directory.find_user(username).await?.is_some())
    }

    async fn create_user(&self, username: &str, _password: &str) -> HerqlesResult<bool> {
        debug!("目录身份后端不创建用户: {}", username);
        Ok(false)
    }

    async fn change_password(&self, username: &str, _password: &str) -> HerqlesResult<()> {
        debug!("目录身份后端不修改密码: {}", username);
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> HerqlesResult<bool> {
        debug!("目录身份后端不删除用户: {}", username);
        Ok(false)
    }

    async fn authenticate(&self, username: &str, password: &str) -> HerqlesResult<bool> {
        self.directory.authenticate(username, password).await
    }
}
