use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use optimizer_core::models::{JobStatus, OptimizationJob};
use optimizer_core::traits::JobRepository;
use optimizer_core::{OptimizerError, OptimizerResult};

use crate::database::mapping::MappingHelpers;

const JOB_COLUMNS: &str = "id, owner_id, schedule_id, trigger_type, parameters, status, \
     tasks_analyzed, priorities_changed, errors_count, error_details, progress_percentage, \
     current_task_id, retry_of, created_at, started_at, completed_at";

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &SqliteRow) -> OptimizerResult<OptimizationJob> {
        Ok(OptimizationJob {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            schedule_id: row.try_get("schedule_id")?,
            trigger: row.try_get("trigger_type")?,
            parameters: MappingHelpers::parse_json(row, "parameters")?,
            status: row.try_get("status")?,
            tasks_analyzed: MappingHelpers::get_u32(row, "tasks_analyzed")?,
            priorities_changed: MappingHelpers::get_u32(row, "priorities_changed")?,
            errors_count: MappingHelpers::get_u32(row, "errors_count")?,
            error_details: MappingHelpers::parse_json(row, "error_details")?,
            progress_percentage: row.try_get("progress_percentage")?,
            current_task_id: row.try_get("current_task_id")?,
            retry_of: row.try_get("retry_of")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    #[instrument(skip(self, job), fields(owner_id = job.owner_id, trigger = job.trigger.as_str()))]
    async fn create(&self, job: &OptimizationJob) -> OptimizerResult<OptimizationJob> {
        let row = sqlx::query(&format!(
            "INSERT INTO optimization_jobs (owner_id, schedule_id, trigger_type, parameters, status, \
             tasks_analyzed, priorities_changed, errors_count, error_details, progress_percentage, \
             current_task_id, retry_of, created_at, started_at, completed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {JOB_COLUMNS}"
        ))
        .bind(job.owner_id)
        .bind(job.schedule_id)
        .bind(job.trigger)
        .bind(MappingHelpers::to_json(&job.parameters)?)
        .bind(job.status)
        .bind(i64::from(job.tasks_analyzed))
        .bind(i64::from(job.priorities_changed))
        .bind(i64::from(job.errors_count))
        .bind(MappingHelpers::to_json(&job.error_details)?)
        .bind(job.progress_percentage)
        .bind(job.current_task_id)
        .bind(job.retry_of)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_job(&row)
    }

    async fn get_by_id(&self, id: i64) -> OptimizerResult<Option<OptimizationJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM optimization_jobs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    #[instrument(skip(self, job), fields(job_id = job.id, status = %job.status))]
    async fn update(&self, job: &OptimizationJob) -> OptimizerResult<()> {
        let result = sqlx::query(
            "UPDATE optimization_jobs SET status = ?, tasks_analyzed = ?, priorities_changed = ?, \
             errors_count = ?, error_details = ?, progress_percentage = ?, current_task_id = ?, \
             started_at = ?, completed_at = ? WHERE id = ?",
        )
        .bind(job.status)
        .bind(i64::from(job.tasks_analyzed))
        .bind(i64::from(job.priorities_changed))
        .bind(i64::from(job.errors_count))
        .bind(MappingHelpers::to_json(&job.error_details)?)
        .bind(job.progress_percentage)
        .bind(job.current_task_id)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OptimizerError::JobNotFound { id: job.id });
        }
        Ok(())
    }

    async fn find_active_for_schedule(
        &self,
        schedule_id: i64,
    ) -> OptimizerResult<Option<OptimizationJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM optimization_jobs \
             WHERE schedule_id = ? AND status IN ('pending', 'running') ORDER BY id LIMIT 1"
        ))
        .bind(schedule_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn list(&self, owner_id: i64, limit: Option<u32>) -> OptimizerResult<Vec<OptimizationJob>> {
        let limit = limit.map(i64::from).unwrap_or(-1);
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM optimization_jobs WHERE owner_id = ? ORDER BY id DESC LIMIT ?"
        ))
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_job).collect()
    }

    async fn count(&self, owner_id: i64, status: Option<JobStatus>) -> OptimizerResult<u64> {
        let count: i64 = match status {
            Some(status) => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM optimization_jobs WHERE owner_id = ? AND status = ?",
                )
                .bind(owner_id)
                .bind(status)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM optimization_jobs WHERE owner_id = ?")
                    .bind(owner_id)
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        Ok(count.max(0) as u64)
    }
}
