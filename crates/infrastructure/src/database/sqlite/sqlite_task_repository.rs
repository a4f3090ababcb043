use async_trait::async_trait;
use chrono::Utc;
use herqles_core::{
    models::{Action, Task, TaskFilter, TaskStatus},
    traits::{StatusChange, TaskRepository},
    HerqlesError, HerqlesResult,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use super::decode_json;

const TASK_COLUMNS: &str =
    "t.id, t.job_target_id, t.name, t.status, t.error_message, t.created_at, t.updated_at, t.stopped_at";

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::sqlite::SqliteRow, actions: Vec<Action>) -> HerqlesResult<Task> {
        Ok(Task {
            id: row.try_get("id")?,
            job_target_id: row.try_get("job_target_id")?,
            name: row.try_get("name")?,
            status: row.try_get("status")?,
            error_message: row.try_get("error_message")?,
            actions,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            stopped_at: row.try_get("stopped_at")?,
        })
    }

    async fn load_actions(&self, task_id: i64) -> HerqlesResult<Vec<Action>> {
        let rows = sqlx::query(
            "SELECT processor, arguments FROM actions WHERE task_id = $1 ORDER BY position ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(HerqlesError::Database)?;

        rows.iter()
            .map(|row| -> HerqlesResult<Action> {
                let arguments: Option<String> = row.try_get("arguments")?;
                Ok(Action {
                    processor: row.try_get("processor")?,
                    arguments: arguments
                        .map(|raw| decode_json(&raw, "动作参数"))
                        .transpose()?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn find_by_id(&self, id: i64) -> HerqlesResult<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(HerqlesError::Database)?;

        match row {
            Some(row) => {
                let actions = self.load_actions(id).await?;
                Ok(Some(Self::row_to_task(&row, actions)?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &TaskFilter) -> HerqlesResult<Vec<Task>> {
        if filter.page < 1 {
            return Err(HerqlesError::validation("页码必须从1开始"));
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {TASK_COLUMNS} FROM tasks t JOIN job_targets jt ON t.job_target_id = jt.id"
        ));
        if let Some(job_id) = filter.job_id {
            builder.push(" WHERE jt.job_id = ").push_bind(job_id);
        }
        builder
            .push(" ORDER BY t.id DESC LIMIT ")
            .push_bind(TaskFilter::PER_PAGE)
            .push(" OFFSET ")
            .push_bind(filter.offset());

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(HerqlesError::Database)?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let actions = self.load_actions(id).await?;
            tasks.push(Self::row_to_task(row, actions)?);
        }
        Ok(tasks)
    }

    async fn compare_and_set_status(
        &self,
        id: i64,
        expected: TaskStatus,
        change: &StatusChange,
    ) -> HerqlesResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET
                status = $1,
                error_message = COALESCE($2, error_message),
                stopped_at = COALESCE($3, stopped_at),
                updated_at = $4
            WHERE id = $5 AND status = $6
            "#,
        )
        .bind(change.status)
        .bind(change.error_message.as_deref())
        .bind(change.stopped_at)
        .bind(Utc::now())
        .bind(id)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(HerqlesError::Database)?;

        let applied = result.rows_affected() > 0;
        debug!(
            "任务状态CAS {} {} -> {}: {}",
            id, expected, change.status, applied
        );
        Ok(applied)
    }
}
