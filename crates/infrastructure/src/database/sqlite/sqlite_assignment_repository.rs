use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herqles_core::{
    models::{Token, UserAssignment},
    traits::AssignmentRepository,
    HerqlesError, HerqlesResult,
};
use sqlx::{Row, SqlitePool};
use tracing::debug;

pub struct SqliteAssignmentRepository {
    pool: SqlitePool,
}

impl SqliteAssignmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_assignment(row: &sqlx::sqlite::SqliteRow) -> HerqlesResult<UserAssignment> {
        Ok(UserAssignment {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_token(row: &sqlx::sqlite::SqliteRow) -> HerqlesResult<Token> {
        Ok(Token {
            token: row.try_get("token")?,
            user_assignment_id: row.try_get("user_assignment_id")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl AssignmentRepository for SqliteAssignmentRepository {
    async fn find_by_username(&self, username: &str) -> HerqlesResult<Option<UserAssignment>> {
        let row = sqlx::query(
            "SELECT id, username, created_at FROM user_assignments WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(HerqlesError::Database)?;

        row.as_ref().map(Self::row_to_assignment).transpose()
    }

    async fn create(&self, username: &str) -> HerqlesResult<UserAssignment> {
        let row = sqlx::query(
            r#"
            INSERT INTO user_assignments (username, created_at) VALUES ($1, $2)
            ON CONFLICT(username) DO UPDATE SET username = excluded.username
            RETURNING id, username, created_at
            "#,
        )
        .bind(username)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(HerqlesError::Database)?;

        debug!("创建授权记录: {}", username);
        Self::row_to_assignment(&row)
    }

    async fn delete(&self, username: &str) -> HerqlesResult<bool> {
        let result = sqlx::query("DELETE FROM user_assignments WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await
            .map_err(HerqlesError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_token(&self, assignment_id: i64) -> HerqlesResult<Option<Token>> {
        let row = sqlx::query(
            "SELECT token, user_assignment_id, updated_at FROM tokens WHERE user_assignment_id = $1",
        )
        .bind(assignment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(HerqlesError::Database)?;

        row.as_ref().map(Self::row_to_token).transpose()
    }

    async fn find_by_token(&self, token: &str) -> HerqlesResult<Option<(UserAssignment, Token)>> {
        let row = sqlx::query(
            r#"
            SELECT ua.id, ua.username, ua.created_at, t.token, t.user_assignment_id, t.updated_at
            FROM tokens t
            JOIN user_assignments ua ON ua.id = t.user_assignment_id
            WHERE t.token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(HerqlesError::Database)?;

        match row {
            Some(row) => Ok(Some((
                Self::row_to_assignment(&row)?,
                Self::row_to_token(&row)?,
            ))),
            None => Ok(None),
        }
    }

    async fn store_token(
        &self,
        assignment_id: i64,
        token: &str,
        updated_at: DateTime<Utc>,
    ) -> HerqlesResult<Token> {
        let row = sqlx::query(
            r#"
            INSERT INTO tokens (user_assignment_id, token, updated_at) VALUES ($1, $2, $3)
            ON CONFLICT(user_assignment_id) DO UPDATE SET
                token = excluded.token,
                updated_at = excluded.updated_at
            RETURNING token, user_assignment_id, updated_at
            "#,
        )
        .bind(assignment_id)
        .bind(token)
        .bind(updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(HerqlesError::Database)?;

        debug!("更新令牌: assignment {}", assignment_id);
        Self::row_to_token(&row)
    }

    async fn list_permissions(&self, assignment_id: i64) -> HerqlesResult<Vec<String>> {
        sqlx::query_scalar(
            "SELECT permission FROM permissions WHERE user_assignment_id = $1 ORDER BY id ASC",
        )
        .bind(assignment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(HerqlesError::Database)
    }

    async fn add_permission(&self, assignment_id: i64, permission: &str) -> HerqlesResult<()> {
        sqlx::query(
            "INSERT INTO permissions (user_assignment_id, permission) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(assignment_id)
        .bind(permission)
        .execute(&self.pool)
        .await
        .map_err(HerqlesError::Database)?;
        Ok(())
    }

    async fn remove_permission(&self, assignment_id: i64, permission: &str) -> HerqlesResult<bool> {
        let result = sqlx::query(
            "DELETE FROM permissions WHERE user_assignment_id = $1 AND permission = $2",
        )
        .bind(assignment_id)
        .bind(permission)
        .execute(&self.pool)
        .await
        .map_err(HerqlesError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
