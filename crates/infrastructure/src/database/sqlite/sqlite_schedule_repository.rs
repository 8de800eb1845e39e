use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use optimizer_core::models::OptimizationSchedule;
use optimizer_core::traits::ScheduleRepository;
use optimizer_core::{OptimizerError, OptimizerResult};

use crate::database::mapping::MappingHelpers;

const SCHEDULE_COLUMNS: &str = "id, owner_id, name, schedule_type, time_of_day, scope, filters, \
     max_changes_per_run, min_confidence_threshold, aggressiveness, is_active, last_run_at, \
     next_run_at, created_at, updated_at";

pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_schedule(row: &SqliteRow) -> OptimizerResult<OptimizationSchedule> {
        Ok(OptimizationSchedule {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            name: row.try_get("name")?,
            schedule_type: row.try_get("schedule_type")?,
            time_of_day: row.try_get("time_of_day")?,
            scope: row.try_get("scope")?,
            filters: MappingHelpers::parse_json(row, "filters")?,
            max_changes_per_run: MappingHelpers::get_u32(row, "max_changes_per_run")?,
            min_confidence_threshold: row.try_get("min_confidence_threshold")?,
            aggressiveness: row.try_get("aggressiveness")?,
            is_active: row.try_get("is_active")?,
            last_run_at: row.try_get("last_run_at")?,
            next_run_at: row.try_get("next_run_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn map_rows(rows: Vec<SqliteRow>) -> OptimizerResult<Vec<OptimizationSchedule>> {
        rows.iter().map(Self::row_to_schedule).collect()
    }
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    #[instrument(skip(self, schedule), fields(owner_id = schedule.owner_id, schedule_type = %schedule.schedule_type))]
    async fn create(
        &self,
        schedule: &OptimizationSchedule,
    ) -> OptimizerResult<OptimizationSchedule> {
        let row = sqlx::query(&format!(
            "INSERT INTO optimization_schedules (owner_id, name, schedule_type, time_of_day, scope, \
             filters, max_changes_per_run, min_confidence_threshold, aggressiveness, is_active, \
             last_run_at, next_run_at, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {SCHEDULE_COLUMNS}"
        ))
        .bind(schedule.owner_id)
        .bind(&schedule.name)
        .bind(schedule.schedule_type)
        .bind(schedule.time_of_day)
        .bind(schedule.scope)
        .bind(MappingHelpers::to_json(&schedule.filters)?)
        .bind(i64::from(schedule.max_changes_per_run))
        .bind(schedule.min_confidence_threshold)
        .bind(schedule.aggressiveness)
        .bind(schedule.is_active)
        .bind(schedule.last_run_at)
        .bind(schedule.next_run_at)
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_schedule(&row)
    }

    async fn get_by_id(
        &self,
        owner_id: i64,
        id: i64,
    ) -> OptimizerResult<Option<OptimizationSchedule>> {
        let row = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM optimization_schedules WHERE id = ? AND owner_id = ?"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_schedule).transpose()
    }

    async fn list(&self, owner_id: i64) -> OptimizerResult<Vec<OptimizationSchedule>> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM optimization_schedules WHERE owner_id = ? ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        Self::map_rows(rows)
    }

    #[instrument(skip(self, schedule), fields(schedule_id = schedule.id))]
    async fn update(&self, schedule: &OptimizationSchedule) -> OptimizerResult<()> {
        let result = sqlx::query(
            "UPDATE optimization_schedules SET name = ?, schedule_type = ?, time_of_day = ?, \
             scope = ?, filters = ?, max_changes_per_run = ?, min_confidence_threshold = ?, \
             aggressiveness = ?, is_active = ?, last_run_at = ?, next_run_at = ?, updated_at = ? \
             WHERE id = ? AND owner_id = ?",
        )
        .bind(&schedule.name)
        .bind(schedule.schedule_type)
        .bind(schedule.time_of_day)
        .bind(schedule.scope)
        .bind(MappingHelpers::to_json(&schedule.filters)?)
        .bind(i64::from(schedule.max_changes_per_run))
        .bind(schedule.min_confidence_threshold)
        .bind(schedule.aggressiveness)
        .bind(schedule.is_active)
        .bind(schedule.last_run_at)
        .bind(schedule.next_run_at)
        .bind(schedule.updated_at)
        .bind(schedule.id)
        .bind(schedule.owner_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OptimizerError::ScheduleNotFound { id: schedule.id });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, owner_id: i64, id: i64) -> OptimizerResult<()> {
        let result = sqlx::query("DELETE FROM optimization_schedules WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OptimizerError::ScheduleNotFound { id });
        }
        Ok(())
    }

    async fn get_due(&self, now: DateTime<Utc>) -> OptimizerResult<Vec<OptimizationSchedule>> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM optimization_schedules \
             WHERE is_active = 1 AND schedule_type IN ('daily', 'hourly') \
             AND next_run_at IS NOT NULL ORDER BY next_run_at, id"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let schedules = Self::map_rows(rows)?;
        // 时间比较在内存中完成，避免依赖文本格式的字典序
        Ok(schedules.into_iter().filter(|s| s.is_due(now)).collect())
    }

    async fn list_on_change(&self, owner_id: i64) -> OptimizerResult<Vec<OptimizationSchedule>> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM optimization_schedules \
             WHERE owner_id = ? AND is_active = 1 AND schedule_type = 'on_change' ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        Self::map_rows(rows)
    }

    #[instrument(skip(self))]
    async fn update_run_times(
        &self,
        id: i64,
        last_run_at: Option<DateTime<Utc>>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> OptimizerResult<()> {
        let result = sqlx::query(
            "UPDATE optimization_schedules SET last_run_at = ?, next_run_at = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(last_run_at)
        .bind(next_run_at)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OptimizerError::ScheduleNotFound { id });
        }
        Ok(())
    }
}
