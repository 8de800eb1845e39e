use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use optimizer_core::models::OptimizationHistory;
use optimizer_core::traits::HistoryRepository;
use optimizer_core::OptimizerResult;

use crate::database::mapping::MappingHelpers;

const HISTORY_COLUMNS: &str = "id, owner_id, task_id, job_id, old_priority, new_priority, \
     priority_score, confidence_level, reasoning, applied_rules, user_accepted, user_feedback, \
     feedback_at, reverted_at, created_at";

/// 只追加的优化历史，反馈和回滚字段各自只能写一次
pub struct SqliteHistoryRepository {
    pool: SqlitePool,
}

impl SqliteHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_history(row: &SqliteRow) -> OptimizerResult<OptimizationHistory> {
        Ok(OptimizationHistory {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            task_id: row.try_get("task_id")?,
            job_id: row.try_get("job_id")?,
            old_priority: row.try_get("old_priority")?,
            new_priority: row.try_get("new_priority")?,
            priority_score: row.try_get("priority_score")?,
            confidence_level: row.try_get("confidence_level")?,
            reasoning: row.try_get("reasoning")?,
            applied_rules: MappingHelpers::parse_json(row, "applied_rules")?,
            user_accepted: row.try_get("user_accepted")?,
            user_feedback: row.try_get("user_feedback")?,
            feedback_at: row.try_get("feedback_at")?,
            reverted_at: row.try_get("reverted_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl HistoryRepository for SqliteHistoryRepository {
    #[instrument(skip(self, history), fields(owner_id = history.owner_id, task_id = history.task_id))]
    async fn create(&self, history: &OptimizationHistory) -> OptimizerResult<OptimizationHistory> {
        let row = sqlx::query(&format!(
            "INSERT INTO optimization_history (owner_id, task_id, job_id, old_priority, \
             new_priority, priority_score, confidence_level, reasoning, applied_rules, \
             user_accepted, user_feedback, feedback_at, reverted_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {HISTORY_COLUMNS}"
        ))
        .bind(history.owner_id)
        .bind(history.task_id)
        .bind(history.job_id)
        .bind(history.old_priority)
        .bind(history.new_priority)
        .bind(history.priority_score)
        .bind(history.confidence_level)
        .bind(&history.reasoning)
        .bind(MappingHelpers::to_json(&history.applied_rules)?)
        .bind(history.user_accepted)
        .bind(&history.user_feedback)
        .bind(history.feedback_at)
        .bind(history.reverted_at)
        .bind(history.created_at)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_history(&row)
    }

    async fn get_by_id(
        &self,
        owner_id: i64,
        id: i64,
    ) -> OptimizerResult<Option<OptimizationHistory>> {
        let row = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM optimization_history WHERE id = ? AND owner_id = ?"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_history).transpose()
    }

    async fn list(
        &self,
        owner_id: i64,
        limit: Option<u32>,
    ) -> OptimizerResult<Vec<OptimizationHistory>> {
        // LIMIT -1 表示不限制
        let limit = limit.map(i64::from).unwrap_or(-1);
        let rows = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM optimization_history \
             WHERE owner_id = ? ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_history).collect()
    }

    async fn list_by_job(&self, job_id: i64) -> OptimizerResult<Vec<OptimizationHistory>> {
        let rows = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM optimization_history WHERE job_id = ? ORDER BY id"
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_history).collect()
    }

    #[instrument(skip(self, feedback))]
    async fn record_feedback(
        &self,
        id: i64,
        accepted: bool,
        feedback: Option<&str>,
        at: DateTime<Utc>,
    ) -> OptimizerResult<bool> {
        let result = sqlx::query(
            "UPDATE optimization_history SET user_accepted = ?, user_feedback = ?, feedback_at = ? \
             WHERE id = ? AND user_accepted IS NULL",
        )
        .bind(accepted)
        .bind(feedback)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn mark_reverted(&self, id: i64, at: DateTime<Utc>) -> OptimizerResult<bool> {
        let result = sqlx::query(
            "UPDATE optimization_history SET reverted_at = ? WHERE id = ? AND reverted_at IS NULL",
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn is_rule_referenced(&self, rule_id: i64) -> OptimizerResult<bool> {
        let referenced: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM optimization_history h, json_each(h.applied_rules) r \
             WHERE json_extract(r.value, '$.rule_id') = ?)",
        )
        .bind(rule_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(referenced)
    }
}
