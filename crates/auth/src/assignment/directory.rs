use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use herqles_core::{
    models::IssuedToken,
    traits::{AssignmentRepository, DirectoryService},
    HerqlesResult,
};
use tracing::{debug, warn};

use super::{user_not_found, AssignmentBackend};
use crate::token::TokenManager;

/// 去掉组DN末尾的 `base_dn` 及其前面的逗号
///
/// `CN=Ops,OU=Groups,DC=example,DC=com` 在 `DC=example,DC=com` 下为
/// `CN=Ops,OU=Groups`；不在 `base_dn` 下的组返回 `None`。
pub fn relative_group_name<'a>(group_dn: &'a str, base_dn: &str) -> Option<&'a str> {
    let relative = group_dn.strip_suffix(base_dn)?;
    let relative = relative.strip_suffix(',').unwrap_or(relative);
    (!relative.is_empty()).then_some(relative)
}

/// 权限来自目录组映射的授权后端
///
/// 授权记录仍存于数据库(用于令牌)，权限不可直接增删。
pub struct DirectoryAssignmentBackend {
    assignments: Arc<dyn AssignmentRepository>,
    directory: Arc<dyn DirectoryService>,
    tokens: TokenManager,
    mapping: HashMap<String, Vec<String>>,
    admin_username: Option<String>,
}

impl DirectoryAssignmentBackend {
    pub fn new(
        assignments: Arc<dyn AssignmentRepository>,
        directory: Arc<dyn DirectoryService>,
        tokens: TokenManager,
        mapping: HashMap<String, Vec<String>>,
        admin_username: Option<String>,
    ) -> Self {
        Self {
            assignments,
            directory,
            tokens,
            mapping,
            admin_username,
        }
    }
}

#[async_trait]
impl AssignmentBackend for DirectoryAssignmentBackend {
    fn name(&self) -> &'static str {
        "ldap"
    }

    fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    fn admin_username(&self) -> Option<&str> {
        self.admin_username.as_deref()
    }

    /// 目录中存在但尚无记录的用户会在此时补建记录
    async fn has_assignment(&self, username: &str) -> HerqlesResult<bool> {
        if self.assignments.find_by_username(username).await?.is_some() {
            return Ok(true);
        }
        if self.directory.find_user(username).await?.is_none() {
            return Ok(false);
        }
        self.assignments.create(username).await?;
        debug!("为目录用户补建授权记录: {}", username);
        Ok(true)
    }

    async fn create_assignment(&self, username: &str) -> HerqlesResult<()> {
        if self.directory.find_user(username).await?.is_none() {
            warn!("目录中不存在用户，跳过创建授权记录: {}", username);
            return Ok(());
        }
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
        let Some(entry) = self.directory.find_user(username).await? else {
            return Ok(Vec::new());
        };

        let base_dn = self.directory.base_dn();
        let mut granted = BTreeSet::new();
        for group in &entry.groups {
            let Some(name) = relative_group_name(group, base_dn) else {
                continue;
            };
            if let Some(permissions) = self.mapping.get(name) {
                granted.extend(permissions.iter().cloned());
            }
        }

        Ok(granted.into_iter().collect())
    }

    async fn add_permission(&self, username: &str, permission: &str) -> HerqlesResult<()> {
        debug!("目录授权后端忽略权限授予: {} -> {}", permission, username);
        Ok(())
    }

    async fn remove_permission(&self, username: &str, permission: &str) -> HerqlesResult<()> {
        debug!("目录授权后端忽略权限撤销: {} <- {}", permission, username);
        Ok(())
    }

    async fn issue_token(&self, username: &str, force: bool) -> HerqlesResult<IssuedToken> {
        if !self.has_assignment(username).await? {
            return Err(user_not_found(username));
        }
        let assignment = self
            .assignments
            .find_by_username(username)
            .await?
            .ok_or_else(|| user_not_found(username))?;
        self.tokens.issue(&assignment, force).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use herqles_infrastructure::database::{DatabaseManager, SqliteAssignmentRepository};
    use herqles_infrastructure::InMemoryDirectory;

    const BASE_DN: &str = "DC=example,DC=com";

    async fn backend(admin: Option<&str>) -> DirectoryAssignmentBackend {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo: Arc<dyn AssignmentRepository> =
            Arc::new(SqliteAssignmentRepository::new(db.pool().clone()));
        let directory = InMemoryDirectory::new(BASE_DN)
            .with_user(
                "bob",
                "pw",
                &["CN=Ops,OU=Groups,DC=example,DC=com", "CN=Other,DC=elsewhere"],
            )
            .with_user("carol", "pw", &[]);

        let mut mapping = HashMap::new();
        mapping.insert(
            "CN=Ops,OU=Groups".to_string(),
            vec!["herqles.job.*".to_string(), "herqles.task.get".to_string()],
        );

        DirectoryAssignmentBackend::new(
            repo.clone(),
            Arc::new(directory),
            TokenManager::new(repo, Duration::hours(3)),
            mapping,
            admin.map(str::to_string),
        )
    }

    #[test]
    fn test_relative_group_name() {
        assert_eq!(
            relative_group_name("CN=Ops,OU=Groups,DC=example,DC=com", BASE_DN),
            Some("CN=Ops,OU=Groups")
        );
        assert_eq!(relative_group_name("CN=Other,DC=elsewhere", BASE_DN), None);
        assert_eq!(relative_group_name(BASE_DN, BASE_DN), None);
    }

    #[tokio::test]
    async fn test_permissions_from_group_mapping() {
        let backend = backend(None).await;
        assert_eq!(
            backend.permissions("bob").await.unwrap(),
            vec!["herqles.job.*".to_string(), "herqles.task.get".to_string()]
        );
        assert!(backend.permissions("carol").await.unwrap().is_empty());
        assert!(backend
            .has_permission("bob", "herqles.job.launch", false)
            .await
            .unwrap());
        assert!(!backend
            .has_permission("carol", "herqles.job.get", false)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_has_assignment_provisions_directory_users() {
        let backend = backend(None).await;
        assert!(backend.assignment_id("bob").await.unwrap().is_none());
        assert!(backend.has_assignment("bob").await.unwrap());
        assert!(backend.assignment_id("bob").await.unwrap().is_some());
        assert!(!backend.has_assignment("mallory").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_for_unknown_user_is_skipped() {
        let backend = backend(None).await;
        backend.create_assignment("mallory").await.unwrap();
        assert!(backend.assignment_id("mallory").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_permission_edits_are_ignored() {
        let backend = backend(None).await;
        backend.add_permission("carol", "herqles.*").await.unwrap();
        assert!(backend.permissions("carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_optional_admin_bypass() {
        let with_admin = backend(Some("carol")).await;
        assert!(with_admin
            .has_permission("carol", "herqles.user.add", true)
            .await
            .unwrap());

        let without = backend(None).await;
        assert!(!without
            .has_permission("carol", "herqles.user.add", true)
            .await
            .unwrap());
    }
}
