//! 任务存储协作方的SQLite适配器
//!
//! 任务本身的增删改不属于引擎，这里只提供候选任务查询和优先级写回，
//! 以及测试和初始化数据时使用的写入方法。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};

use optimizer_core::models::{
    BlockedTaskRef, OptimizationScope, Priority, TaskQuery, TaskSnapshot, TaskStatus,
};
use optimizer_core::traits::TaskStore;
use optimizer_core::{OptimizerError, OptimizerResult};

const TASK_COLUMNS: &str =
    "id, owner_id, title, priority, status, due_date, category, project_id, updated_at";

pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 插入或覆盖任务（不含依赖关系）
    pub async fn upsert_task(&self, task: &TaskSnapshot) -> OptimizerResult<()> {
        sqlx::query(
            "INSERT INTO tasks (id, owner_id, title, priority, status, due_date, category, \
             project_id, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET owner_id = excluded.owner_id, title = excluded.title, \
             priority = excluded.priority, status = excluded.status, due_date = excluded.due_date, \
             category = excluded.category, project_id = excluded.project_id, \
             updated_at = excluded.updated_at",
        )
        .bind(task.id)
        .bind(task.owner_id)
        .bind(&task.title)
        .bind(task.priority)
        .bind(task.status)
        .bind(task.due_date)
        .bind(&task.category)
        .bind(task.project_id)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 记录 `task_id` 阻塞 `blocked_task_id`
    pub async fn add_dependency(&self, task_id: i64, blocked_task_id: i64) -> OptimizerResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO task_dependencies (task_id, blocked_task_id) VALUES (?, ?)",
        )
        .bind(task_id)
        .bind(blocked_task_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_task(row: &SqliteRow) -> OptimizerResult<TaskSnapshot> {
        Ok(TaskSnapshot {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            title: row.try_get("title")?,
            priority: row.try_get("priority")?,
            status: row.try_get("status")?,
            due_date: row.try_get("due_date")?,
            category: row.try_get("category")?,
            project_id: row.try_get("project_id")?,
            blocked_tasks: vec![],
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// 批量加载未关闭的下游任务
    async fn load_blocked_tasks(
        &self,
        task_ids: &[i64],
    ) -> OptimizerResult<HashMap<i64, Vec<BlockedTaskRef>>> {
        let mut blocked: HashMap<i64, Vec<BlockedTaskRef>> = HashMap::new();
        if task_ids.is_empty() {
            return Ok(blocked);
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT d.task_id, d.blocked_task_id, t.due_date FROM task_dependencies d \
             JOIN tasks t ON t.id = d.blocked_task_id \
             WHERE t.status NOT IN ('completed', 'cancelled') AND d.task_id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in task_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY d.task_id, d.blocked_task_id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        for row in rows {
            let task_id: i64 = row.try_get("task_id")?;
            let due_date: Option<DateTime<Utc>> = row.try_get("due_date")?;
            blocked.entry(task_id).or_default().push(BlockedTaskRef {
                task_id: row.try_get("blocked_task_id")?,
                due_date,
            });
        }
        Ok(blocked)
    }

    async fn attach_blocked_tasks(
        &self,
        mut tasks: Vec<TaskSnapshot>,
    ) -> OptimizerResult<Vec<TaskSnapshot>> {
        let ids: Vec<i64> = tasks.iter().map(|t| t.id).collect();
        let mut blocked = self.load_blocked_tasks(&ids).await?;
        for task in &mut tasks {
            task.blocked_tasks = blocked.remove(&task.id).unwrap_or_default();
        }
        Ok(tasks)
    }

    fn push_in<T>(builder: &mut QueryBuilder<'_, Sqlite>, column: &str, values: &[T])
    where
        T: Clone + Send + for<'q> sqlx::Encode<'q, Sqlite> + sqlx::Type<Sqlite> + 'static,
    {
        builder.push(format!(" AND {column} IN ("));
        let mut separated = builder.separated(", ");
        for value in values {
            separated.push_bind(value.clone());
        }
        separated.push_unseparated(")");
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn get_tasks(&self, query: &TaskQuery) -> OptimizerResult<Vec<TaskSnapshot>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status NOT IN ('completed', 'cancelled') \
             AND owner_id = "
        ));
        builder.push_bind(query.owner_id);

        match query.scope {
            OptimizationScope::All => {}
            OptimizationScope::Pending => {
                builder.push(" AND status = ");
                builder.push_bind(TaskStatus::Pending);
            }
            OptimizationScope::Active => {
                builder.push(" AND status = ");
                builder.push_bind(TaskStatus::InProgress);
            }
            OptimizationScope::Overdue => {
                builder.push(" AND due_date IS NOT NULL AND due_date <= ");
                builder.push_bind(Utc::now());
            }
        }

        if let Some(task_ids) = &query.task_ids {
            if task_ids.is_empty() {
                return Ok(vec![]);
            }
            Self::push_in(&mut builder, "id", task_ids);
        }
        if !query.filters.categories.is_empty() {
            Self::push_in(&mut builder, "category", &query.filters.categories);
        }
        if !query.filters.project_ids.is_empty() {
            Self::push_in(&mut builder, "project_id", &query.filters.project_ids);
        }
        if !query.filters.priorities.is_empty() {
            Self::push_in(&mut builder, "priority", &query.filters.priorities);
        }

        builder.push(" ORDER BY id LIMIT ");
        builder.push_bind(i64::from(query.limit));
        builder.push(" OFFSET ");
        builder.push_bind(i64::from(query.offset));

        let rows = builder.build().fetch_all(&self.pool).await?;
        let tasks = rows
            .iter()
            .map(Self::row_to_task)
            .collect::<OptimizerResult<Vec<_>>>()?;
        debug!(
            owner_id = query.owner_id,
            scope = query.scope.as_str(),
            count = tasks.len(),
            "Loaded candidate tasks"
        );

        self.attach_blocked_tasks(tasks).await
    }

    async fn get_task(&self, owner_id: i64, task_id: i64) -> OptimizerResult<Option<TaskSnapshot>> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND owner_id = ?"
        ))
        .bind(task_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(task) = row.as_ref().map(Self::row_to_task).transpose()? else {
            return Ok(None);
        };
        Ok(self.attach_blocked_tasks(vec![task]).await?.pop())
    }

    #[instrument(skip(self))]
    async fn set_priority(
        &self,
        owner_id: i64,
        task_id: i64,
        priority: Priority,
    ) -> OptimizerResult<()> {
        let result = sqlx::query(
            "UPDATE tasks SET priority = ?, updated_at = ? WHERE id = ? AND owner_id = ?",
        )
        .bind(priority)
        .bind(Utc::now())
        .bind(task_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OptimizerError::TaskNotFound { id: task_id });
        }
        Ok(())
    }
}
