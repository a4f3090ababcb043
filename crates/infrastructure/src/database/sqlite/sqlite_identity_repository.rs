use async_trait::async_trait;
use chrono::Utc;
use herqles_core::{traits::IdentityRepository, HerqlesError, HerqlesResult};
use sqlx::SqlitePool;
use tracing::debug;

pub struct SqliteIdentityRepository {
    pool: SqlitePool,
}

impl SqliteIdentityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for SqliteIdentityRepository {
    async fn find_password_hash(&self, username: &str) -> HerqlesResult<Option<String>> {
        sqlx::query_scalar("SELECT password_hash FROM identities WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(HerqlesError::Database)
    }

    async fn create(&self, username: &str, password_hash: &str) -> HerqlesResult<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO identities (username, password_hash, created_at, updated_at) VALUES ($1, $2, $3, $3)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(HerqlesError::Database)?;

        debug!("创建用户身份: {}", username);
        Ok(())
    }

    async fn update_password(&self, username: &str, password_hash: &str) -> HerqlesResult<bool> {
        let result = sqlx::query(
            "UPDATE identities SET password_hash = $1, updated_at = $2 WHERE username = $3",
        )
        .bind(password_hash)
        .bind(Utc::now())
        .bind(username)
        .execute(&self.pool)
        .await
        .map_err(HerqlesError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, username: &str) -> HerqlesResult<bool> {
        let result = sqlx::query("DELETE FROM identities WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await
            .map_err(HerqlesError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
