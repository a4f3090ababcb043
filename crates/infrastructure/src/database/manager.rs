use async_trait::async_trait;
use herqles_core::{config::DatabaseConfig, traits::HealthCheck, HerqlesError, HerqlesResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// 嵌入的数据库迁移
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// 数据库管理器，持有连接池并负责迁移与健康检查
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// 按配置建立连接池并执行迁移
    pub async fn connect(config: &DatabaseConfig) -> HerqlesResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(HerqlesError::Database)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect_with(options)
            .await
            .map_err(HerqlesError::Database)?;

        let manager = Self { pool };
        manager.migrate().await?;
        info!("数据库连接成功: {}", config.url);
        Ok(manager)
    }

    /// 单连接的内存数据库
    pub async fn in_memory() -> HerqlesResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(HerqlesError::Database)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(HerqlesError::Database)?;

        let manager = Self { pool };
        manager.migrate().await?;
        Ok(manager)
    }

    pub async fn migrate(&self) -> HerqlesResult<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| HerqlesError::Database(e.into()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("数据库连接池已关闭");
    }
}

#[async_trait]
impl HealthCheck for DatabaseManager {
    async fn health_check(&self) -> HerqlesResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(HerqlesError::Database)?;
        Ok(())
    }
}
