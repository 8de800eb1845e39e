use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use optimizer_core::models::{SubScores, TaskPriorityScore};
use optimizer_core::traits::ScoreRepository;
use optimizer_core::OptimizerResult;

const SCORE_COLUMNS: &str = "id, task_id, owner_id, job_id, calculated_priority, priority_score, \
     confidence_level, urgency_score, importance_score, context_score, pattern_score, \
     dependency_score, is_current, calculated_at";

pub struct SqliteScoreRepository {
    pool: SqlitePool,
}

impl SqliteScoreRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_score(row: &SqliteRow) -> OptimizerResult<TaskPriorityScore> {
        Ok(TaskPriorityScore {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            owner_id: row.try_get("owner_id")?,
            job_id: row.try_get("job_id")?,
            calculated_priority: row.try_get("calculated_priority")?,
            priority_score: row.try_get("priority_score")?,
            confidence_level: row.try_get("confidence_level")?,
            sub_scores: SubScores {
                urgency_score: row.try_get("urgency_score")?,
                importance_score: row.try_get("importance_score")?,
                context_score: row.try_get("context_score")?,
                pattern_score: row.try_get("pattern_score")?,
                dependency_score: row.try_get("dependency_score")?,
            },
            is_current: row.try_get("is_current")?,
            calculated_at: row.try_get("calculated_at")?,
        })
    }
}

#[async_trait]
impl ScoreRepository for SqliteScoreRepository {
    /// 在同一事务内清除旧的当前评分并插入新记录
    #[instrument(skip(self, score), fields(owner_id = score.owner_id, task_id = score.task_id))]
    async fn save_current(&self, score: &TaskPriorityScore) -> OptimizerResult<TaskPriorityScore> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE task_priority_scores SET is_current = 0 \
             WHERE owner_id = ? AND task_id = ? AND is_current = 1",
        )
        .bind(score.owner_id)
        .bind(score.task_id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            "INSERT INTO task_priority_scores (task_id, owner_id, job_id, calculated_priority, \
             priority_score, confidence_level, urgency_score, importance_score, context_score, \
             pattern_score, dependency_score, is_current, calculated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?) RETURNING {SCORE_COLUMNS}"
        ))
        .bind(score.task_id)
        .bind(score.owner_id)
        .bind(score.job_id)
        .bind(score.calculated_priority)
        .bind(score.priority_score)
        .bind(score.confidence_level)
        .bind(score.sub_scores.urgency_score)
        .bind(score.sub_scores.importance_score)
        .bind(score.sub_scores.context_score)
        .bind(score.sub_scores.pattern_score)
        .bind(score.sub_scores.dependency_score)
        .bind(score.calculated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Self::row_to_score(&row)
    }

    async fn get_current(
        &self,
        owner_id: i64,
        task_id: i64,
    ) -> OptimizerResult<Option<TaskPriorityScore>> {
        let row = sqlx::query(&format!(
            "SELECT {SCORE_COLUMNS} FROM task_priority_scores \
             WHERE owner_id = ? AND task_id = ? AND is_current = 1"
        ))
        .bind(owner_id)
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_score).transpose()
    }

    async fn list_for_task(
        &self,
        owner_id: i64,
        task_id: i64,
    ) -> OptimizerResult<Vec<TaskPriorityScore>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCORE_COLUMNS} FROM task_priority_scores \
             WHERE owner_id = ? AND task_id = ? ORDER BY id DESC"
        ))
        .bind(owner_id)
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_score).collect()
    }
}
