use async_trait::async_trait;

use crate::errors::HerqlesResult;

/// A user as seen by the directory service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub username: String,
    pub display_name: Option<String>,
    /// Full `memberOf` distinguished names
    pub groups: Vec<String>,
}

/// 目录服务(LDAP)只读接口
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// 以用户身份绑定，凭据错误时返回 `false`
    async fn authenticate(&self, username: &str, password: &str) -> HerqlesResult<bool>;

    async fn find_user(&self, username: &str) -> HerqlesResult<Option<DirectoryEntry>>;

    fn base_dn(&self) -> &str;
}
