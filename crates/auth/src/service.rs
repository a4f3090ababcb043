use std::sync::Arc;

use herqles_core::{models::Principal, HerqlesError, HerqlesResult};
use tracing::debug;

use crate::assignment::AssignmentBackend;

/// 令牌校验与权限判定，供 `security.validate` 与本地REST校验共用
#[derive(Clone)]
pub struct AuthorizationService {
    assignment: Arc<dyn AssignmentBackend>,
}

impl AuthorizationService {
    pub fn new(assignment: Arc<dyn AssignmentBackend>) -> Self {
        Self { assignment }
    }

    pub fn backend(&self) -> &Arc<dyn AssignmentBackend> {
        &self.assignment
    }

    /// 解析令牌；给出 `permission` 时还要求持有者满足该权限(非精确匹配)
    pub async fn validate(
        &self,
        token: &str,
        permission: Option<&str>,
    ) -> HerqlesResult<Principal> {
        let result = self.check(token, permission).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(HerqlesError::InvalidToken) => "invalid_token",
            Err(HerqlesError::PermissionDenied { .. }) => "denied",
            Err(_) => "error",
        };
        metrics::counter!("herqles_auth_validations_total", "outcome" => outcome).increment(1);
        result
    }

    async fn check(&self, token: &str, permission: Option<&str>) -> HerqlesResult<Principal> {
        let principal = self
            .assignment
            .validate_token(token)
            .await?
            .ok_or(HerqlesError::InvalidToken)?;

        if let Some(permission) = permission {
            if !self
                .assignment
                .has_permission(&principal.name, permission, false)
                .await?
            {
                debug!("权限不足: {} 需要 {}", principal.name, permission);
                return Err(HerqlesError::permission_denied(permission));
            }
        }

        Ok(principal)
    }

    /// 调用者对自己操作时只需身份，否则需要 `permission`
    pub async fn require_self_or(
        &self,
        caller: &Principal,
        username: &str,
        permission: &str,
    ) -> HerqlesResult<()> {
        if caller.name == username {
            return Ok(());
        }
        self.require(caller, permission).await
    }

    pub async fn require(&self, caller: &Principal, permission: &str) -> HerqlesResult<()> {
        if self
            .assignment
            .has_permission(&caller.name, permission, false)
            .await?
        {
            Ok(())
        } else {
            Err(HerqlesError::permission_denied(permission))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::SqlAssignmentBackend;
    use crate::token::TokenManager;
    use chrono::Duration;
    use herqles_core::traits::AssignmentRepository;
    use herqles_infrastructure::database::{DatabaseManager, SqliteAssignmentRepository};

    async fn service() -> AuthorizationService {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo: Arc<dyn AssignmentRepository> =
            Arc::new(SqliteAssignmentRepository::new(db.pool().clone()));
        let backend = SqlAssignmentBackend::new(
            repo.clone(),
            TokenManager::new(repo, Duration::hours(3)),
            "admin",
        );
        backend.bootstrap().await.unwrap();
        AuthorizationService::new(Arc::new(backend))
    }

    #[tokio::test]
    async fn test_validate_with_wildcard_grant() {
        let service = service().await;
        let backend = service.backend();
        backend.create_assignment("alice").await.unwrap();
        backend.add_permission("alice", "herqles.job.*").await.unwrap();
        let token = backend.issue_token("alice", false).await.unwrap().token;

        let principal = service
            .validate(&token, Some("herqles.job.get"))
            .await
            .unwrap();
        assert_eq!(principal.name, "alice");

        let err = service
            .validate(&token, Some("herqles.worker.get"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), 403);
        assert!(matches!(err, HerqlesError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn test_unknown_token_is_invalid() {
        let service = service().await;
        let err = service.validate("nope", None).await.unwrap_err();
        assert!(matches!(err, HerqlesError::InvalidToken));
        assert_eq!(err.code(), 403);
    }

    #[tokio::test]
    async fn test_self_access_skips_permission() {
        let service = service().await;
        let alice = Principal {
            id: 2,
            name: "alice".to_string(),
        };
        service
            .require_self_or(&alice, "alice", "herqles.user.get")
            .await
            .unwrap();
        assert!(service
            .require_self_or(&alice, "bob", "herqles.user.get")
            .await
            .is_err());
    }
}
