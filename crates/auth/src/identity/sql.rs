use std::sync::Arc;

use async_trait::async_trait;
use herqles_core::{traits::IdentityRepository, HerqlesError, HerqlesResult};
use tracing::debug;

use super::IdentityBackend;
use crate::password::{hash_password, verify_password};

/// 本地密码库
pub struct SqlIdentityBackend {
    identities: Arc<dyn IdentityRepository>,
}

impl SqlIdentityBackend {
    pub fn new(identities: Arc<dyn IdentityRepository>) -> Self {
        Self { identities }
    }
}

#[async_trait]
impl IdentityBackend for SqlIdentityBackend {
    fn name(&self) -> &'static str {
        "sql"
    }

    async fn user_exists(&self, username: &str) -> HerqlesResult<bool> {
        Ok(self.identities.find_password_hash(username).await?.is_some())
    }

    async fn create_user(&self, username: &str, password: &str) -> HerqlesResult<bool> {
        if self.user_exists(username).await? {
            return Ok(false);
        }
        self.identities
            .create(username, &hash_password(password)?)
            .await?;
        debug!("创建本地身份: {}", username);
        Ok(true)
    }

    async fn change_password(&self, username: &str, password: &str) -> HerqlesResult<()> {
        let updated = self
            .identities
            .update_password(username, &hash_password(password)?)
            .await?;
        if !updated {
            return Err(HerqlesError::UserNotFound {
                username: username.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> HerqlesResult<bool> {
        self.identities.delete(username).await
    }

    async fn authenticate(&self, username: &str, password: &str) -> HerqlesResult<bool> {
        match self.identities.find_password_hash(username).await? {
            Some(hash) => verify_password(password, &hash),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herqles_infrastructure::database::{DatabaseManager, SqliteIdentityRepository};

    async fn backend() -> SqlIdentityBackend {
        let db = DatabaseManager::in_memory().await.unwrap();
        SqlIdentityBackend::new(Arc::new(SqliteIdentityRepository::new(db.pool().clone())))
    }

    #[tokio::test]
    async fn test_create_and_authenticate() {
        let backend = backend().await;
        assert!(backend.create_user("alice", "secret").await.unwrap());
        assert!(!backend.create_user("alice", "other").await.unwrap());

        assert!(backend.authenticate("alice", "secret").await.unwrap());
        assert!(!backend.authenticate("alice", "other").await.unwrap());
        assert!(!backend.authenticate("bob", "secret").await.unwrap());
    }

    #[tokio::test]
    async fn test_change_password() {
        let backend = backend().await;
        backend.create_user("alice", "old").await.unwrap();
        backend.change_password("alice", "new").await.unwrap();

        assert!(!backend.authenticate("alice", "old").await.unwrap());
        assert!(backend.authenticate("alice", "new").await.unwrap());
        assert!(matches!(
            backend.change_password("bob", "x").await,
            Err(HerqlesError::UserNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_user() {
        let backend = backend().await;
        backend.create_user("alice", "pw").await.unwrap();
        assert!(backend.delete_user("alice").await.unwrap());
        assert!(!backend.delete_user("alice").await.unwrap());
        assert!(!backend.user_exists("alice").await.unwrap());
    }
}
