use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqlitePool};
use tracing::info;

use optimizer_core::config::DatabaseConfig;
use optimizer_core::traits::{
    HistoryRepository, JobRepository, RuleRepository, ScheduleRepository, ScoreRepository,
    SignalAggregator, TaskStore,
};

use super::migrations::run_migrations;
use super::sqlite::{
    SqliteHistoryRepository, SqliteJobRepository, SqliteRuleRepository, SqliteScheduleRepository,
    SqliteScoreRepository, SqliteSignalAggregator, SqliteTaskStore,
};

pub type DbPool = Pool<Sqlite>;

/// 引擎使用的全部仓储和协作方适配器
#[derive(Clone)]
pub struct Repositories {
    pub rules: Arc<dyn RuleRepository>,
    pub scores: Arc<dyn ScoreRepository>,
    pub history: Arc<dyn HistoryRepository>,
    pub schedules: Arc<dyn ScheduleRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub tasks: Arc<dyn TaskStore>,
    pub signals: Arc<dyn SignalAggregator>,
}

pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .with_context(|| format!("无效的数据库URL: {}", config.url))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(1800)) // 30分钟默认生命周期
            .connect_with(options)
            .await
            .context("连接SQLite数据库失败")?;

        info!(url = %config.url, "Connected to SQLite database");
        Ok(Self { pool })
    }

    /// 单连接的内存数据库，已执行迁移
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("无效的内存数据库URL")?
            .foreign_keys(true);
        // 内存数据库每个连接相互独立，只能使用一个连接
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("创建内存数据库失败")?;

        let manager = Self { pool };
        manager.migrate().await?;
        Ok(manager)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        run_migrations(&self.pool).await
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("数据库健康检查失败")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn repositories(&self) -> Repositories {
        let pool = self.pool.clone();
        Repositories {
            rules: Arc::new(SqliteRuleRepository::new(pool.clone())),
            scores: Arc::new(SqliteScoreRepository::new(pool.clone())),
            history: Arc::new(SqliteHistoryRepository::new(pool.clone())),
            schedules: Arc::new(SqliteScheduleRepository::new(pool.clone())),
            jobs: Arc::new(SqliteJobRepository::new(pool.clone())),
            tasks: Arc::new(SqliteTaskStore::new(pool.clone())),
            signals: Arc::new(SqliteSignalAggregator::new(pool)),
        }
    }
}
