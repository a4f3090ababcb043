use async_trait::async_trait;
use chrono::Utc;
use herqles_core::{
    models::{Tags, Worker, WorkerFilter, WorkerRegistration},
    traits::WorkerRepository,
    HerqlesError, HerqlesResult,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use super::{decode_json, encode_json};

const WORKER_COLUMNS: &str =
    "id, target, framework, datacenter, tags, deleted, deleted_at, created_at, updated_at";

pub struct SqliteWorkerRepository {
    pool: SqlitePool,
}

impl SqliteWorkerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_worker(row: &sqlx::sqlite::SqliteRow) -> HerqlesResult<Worker> {
        let tags: String = row.try_get("tags")?;
        Ok(Worker {
            id: row.try_get("id")?,
            target: row.try_get("target")?,
            framework: row.try_get("framework")?,
            datacenter: row.try_get("datacenter")?,
            tags: decode_json::<Tags>(&tags, "Worker标签")?,
            deleted: row.try_get("deleted")?,
            deleted_at: row.try_get("deleted_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl WorkerRepository for SqliteWorkerRepository {
    async fn upsert(&self, registration: &WorkerRegistration) -> HerqlesResult<i64> {
        let now = Utc::now();
        let tags = encode_json(&registration.tags, "Worker标签")?;

        // 已存在的Worker只刷新标签
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO workers (target, framework, datacenter, tags, deleted, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5, $5)
            ON CONFLICT(target, framework) WHERE deleted = 0 DO UPDATE SET
                tags = excluded.tags,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(&registration.target)
        .bind(&registration.framework)
        .bind(&registration.datacenter)
        .bind(tags)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(HerqlesError::Database)?;

        debug!(
            "注册Worker成功: {} ({}/{})",
            id, registration.target, registration.framework
        );
        Ok(id)
    }

    async fn update_tags(&self, target: &str, framework: &str, tags: &Tags) -> HerqlesResult<bool> {
        let result = sqlx::query(
            "UPDATE workers SET tags = $1, updated_at = $2 WHERE target = $3 AND framework = $4 AND deleted = 0",
        )
        .bind(encode_json(tags, "Worker标签")?)
        .bind(Utc::now())
        .bind(target)
        .bind(framework)
        .execute(&self.pool)
        .await
        .map_err(HerqlesError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_active(&self, id: i64) -> HerqlesResult<Option<Worker>> {
        let row = sqlx::query(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers WHERE id = $1 AND deleted = 0"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(HerqlesError::Database)?;

        row.as_ref().map(Self::row_to_worker).transpose()
    }

    async fn list(&self, filter: &WorkerFilter) -> HerqlesResult<Vec<Worker>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {WORKER_COLUMNS} FROM workers WHERE 1 = 1"));

        if !filter.include_deleted {
            builder.push(" AND deleted = 0");
        }
        if let Some(framework) = &filter.framework {
            builder.push(" AND framework = ").push_bind(framework.clone());
        }
        if let Some(target) = &filter.target {
            builder.push(" AND target = ").push_bind(target.clone());
        }
        if let Some(datacenter) = &filter.datacenter {
            builder.push(" AND datacenter = ").push_bind(datacenter.clone());
        }
        builder.push(" ORDER BY id ASC");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(HerqlesError::Database)?;

        rows.iter().map(Self::row_to_worker).collect()
    }

    async fn soft_delete(&self, id: i64) -> HerqlesResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE workers SET deleted = 1, deleted_at = $1, updated_at = $1 WHERE id = $2 AND deleted = 0",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(HerqlesError::Database)?;

        if result.rows_affected() > 0 {
            debug!("软删除Worker成功: {}", id);
        }
        Ok(result.rows_affected() > 0)
    }
}
