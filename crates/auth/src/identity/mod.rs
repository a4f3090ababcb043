//! 身份后端：用户是否存在以及密码校验

mod directory;
mod sql;

pub use directory::DirectoryIdentityBackend;
pub use sql::SqlIdentityBackend;

use async_trait::async_trait;
use herqles_core::HerqlesResult;

#[async_trait]
pub trait IdentityBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn user_exists(&self, username: &str) -> HerqlesResult<bool>;

    /// 创建身份，返回是否实际创建
    async fn create_user(&self, username: &str, password: &str) -> HerqlesResult<bool>;

    async fn change_password(&self, username: &str, password: &str) -> HerqlesResult<()>;

    /// 删除身份，返回是否实际删除
    async fn delete_user(&self, username: &str) -> HerqlesResult<bool>;

    async fn authenticate(&self, username: &str, password: &str) -> HerqlesResult<bool>;
}
