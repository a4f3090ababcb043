use async_trait::async_trait;
use chrono::Utc;
use herqles_core::{
    models::{Job, JobStatus, JobTarget, JobTaskSummary, NewJob, Tags, TaskStatus},
    traits::JobRepository,
    HerqlesError, HerqlesResult,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::{decode_json, encode_json};

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_targets(&self, job_id: i64) -> HerqlesResult<Vec<JobTarget>> {
        let rows = sqlx::query(
            r#"
            SELECT jt.id, jt.worker_id, jt.tags, w.target
            FROM job_targets jt
            JOIN workers w ON w.id = jt.worker_id
            WHERE jt.job_id = $1
            ORDER BY jt.id ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(HerqlesError::Database)?;

        let mut targets = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let tags: Option<String> = row.try_get("tags")?;

            let tasks = sqlx::query(
                "SELECT id, status FROM tasks WHERE job_target_id = $1 ORDER BY id ASC",
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(HerqlesError::Database)?
            .iter()
            .map(|task| -> HerqlesResult<JobTaskSummary> {
                Ok(JobTaskSummary {
                    id: task.try_get("id")?,
                    status: task.try_get::<TaskStatus, _>("status")?,
                })
            })
            .collect::<HerqlesResult<Vec<_>>>()?;

            targets.push(JobTarget {
                id,
                worker_id: row.try_get("worker_id")?,
                target: row.try_get("target")?,
                tags: tags
                    .map(|raw| decode_json::<Tags>(&raw, "目标标签"))
                    .transpose()?,
                tasks,
            });
        }
        Ok(targets)
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn create(&self, job: &NewJob) -> HerqlesResult<i64> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(HerqlesError::Database)?;

        let job_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO jobs (name, status, datacenter, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id
            "#,
        )
        .bind(&job.name)
        .bind(JobStatus::Pending)
        .bind(&job.datacenter)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(HerqlesError::Database)?;

        for target in &job.targets {
            let worker_exists: Option<i64> =
                sqlx::query_scalar("SELECT id FROM workers WHERE id = $1 AND deleted = 0")
                    .bind(target.worker_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(HerqlesError::Database)?;
            if worker_exists.is_none() {
                // 事务随tx析构回滚
                return Err(HerqlesError::WorkerNotFound {
                    id: target.worker_id,
                });
            }

            let tags = target
                .tags
                .as_ref()
                .map(|tags| encode_json(tags, "目标标签"))
                .transpose()?;

            let target_id: i64 = sqlx::query_scalar(
                "INSERT INTO job_targets (job_id, worker_id, tags) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(job_id)
            .bind(target.worker_id)
            .bind(tags)
            .fetch_one(&mut *tx)
            .await
            .map_err(HerqlesError::Database)?;

            for task in &target.tasks {
                let task_id: i64 = sqlx::query_scalar(
                    r#"
                    INSERT INTO tasks (job_target_id, name, status, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $4)
                    RETURNING id
                    "#,
                )
                .bind(target_id)
                .bind(&task.name)
                .bind(TaskStatus::Pending)
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(HerqlesError::Database)?;

                for (position, action) in task.actions.iter().enumerate() {
                    let arguments = action
                        .arguments
                        .as_ref()
                        .map(|args| encode_json(args, "动作参数"))
                        .transpose()?;

                    sqlx::query(
                        "INSERT INTO actions (task_id, position, processor, arguments) VALUES ($1, $2, $3, $4)",
                    )
                    .bind(task_id)
                    .bind(position as i64)
                    .bind(&action.processor)
                    .bind(arguments)
                    .execute(&mut *tx)
                    .await
                    .map_err(HerqlesError::Database)?;
                }
            }
        }

        tx.commit().await.map_err(HerqlesError::Database)?;

        info!("创建作业成功: {} ({})", job_id, job.name);
        Ok(job_id)
    }

    async fn find_by_id(&self, id: i64) -> HerqlesResult<Option<Job>> {
        let row = sqlx::query(
            "SELECT id, name, status, datacenter, created_at, updated_at, stopped_at FROM jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(HerqlesError::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let targets = self.load_targets(id).await?;
        debug!("加载作业 {}: {} 个目标", id, targets.len());

        Ok(Some(Job {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            status: row.try_get("status")?,
            datacenter: row.try_get("datacenter")?,
            targets,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            stopped_at: row.try_get("stopped_at")?,
        }))
    }
}
