use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Priority;
use crate::errors::OptimizerError;

/// 任务状态（由任务存储协作方维护）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// 已完成或已取消的任务不再参与优化
    pub fn is_closed(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(OptimizerError::Validation(format!("无效的任务状态: {s}"))),
        }
    }
}

crate::impl_sqlite_text_enum!(TaskStatus);

/// 被当前任务阻塞的下游任务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockedTaskRef {
    pub task_id: i64,
    pub due_date: Option<DateTime<Utc>>,
}

/// 任务快照，评分所需的全部任务字段
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSnapshot {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub category: Option<String>,
    pub project_id: Option<i64>,
    #[serde(default)]
    pub blocked_tasks: Vec<BlockedTaskRef>,
    pub updated_at: DateTime<Utc>,
}

impl TaskSnapshot {
    pub fn is_open(&self) -> bool {
        !self.status.is_closed()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.due_date.is_some_and(|due| due <= now)
    }

    /// 距离截止时间的小时数，已逾期为负数
    pub fn hours_until_due(&self, now: DateTime<Utc>) -> Option<f64> {
        self.due_date
            .map(|due| (due - now).num_seconds() as f64 / 3600.0)
    }
}

/// 优化范围
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationScope {
    /// 所有未关闭的任务
    #[default]
    All,
    Pending,
    Active,
    Overdue,
}

impl OptimizationScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationScope::All => "all",
            OptimizationScope::Pending => "pending",
            OptimizationScope::Active => "active",
            OptimizationScope::Overdue => "overdue",
        }
    }

    pub fn matches(&self, task: &TaskSnapshot, now: DateTime<Utc>) -> bool {
        if !task.is_open() {
            return false;
        }
        match self {
            OptimizationScope::All => true,
            OptimizationScope::Pending => task.status == TaskStatus::Pending,
            OptimizationScope::Active => task.status == TaskStatus::InProgress,
            OptimizationScope::Overdue => task.is_overdue(now),
        }
    }
}

impl FromStr for OptimizationScope {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(OptimizationScope::All),
            "pending" => Ok(OptimizationScope::Pending),
            "active" => Ok(OptimizationScope::Active),
            "overdue" => Ok(OptimizationScope::Overdue),
            _ => Err(OptimizerError::Validation(format!("无效的优化范围: {s}"))),
        }
    }
}

crate::impl_sqlite_text_enum!(OptimizationScope);

/// 分类/项目/优先级过滤条件，空列表表示不限制
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ScopeFilters {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub project_ids: Vec<i64>,
    #[serde(default)]
    pub priorities: Vec<Priority>,
}

impl ScopeFilters {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.project_ids.is_empty() && self.priorities.is_empty()
    }

    /// 任务是否满足全部过滤维度
    pub fn matches_task(&self, task: &TaskSnapshot) -> bool {
        let category_ok = self.categories.is_empty()
            || task
                .category
                .as_ref()
                .is_some_and(|c| self.categories.iter().any(|f| f == c));
        let project_ok = self.project_ids.is_empty()
            || task
                .project_id
                .is_some_and(|p| self.project_ids.contains(&p));
        let priority_ok = self.priorities.is_empty() || self.priorities.contains(&task.priority);

        category_ok && project_ok && priority_ok
    }

    /// 两组过滤条件是否可能同时命中同一个任务
    ///
    /// 任一方在某个维度为空即视为该维度重叠。
    pub fn overlaps(&self, other: &ScopeFilters) -> bool {
        fn dimension<T: PartialEq>(a: &[T], b: &[T]) -> bool {
            a.is_empty() || b.is_empty() || a.iter().any(|x| b.contains(x))
        }

        dimension(&self.categories, &other.categories)
            && dimension(&self.project_ids, &other.project_ids)
            && dimension(&self.priorities, &other.priorities)
    }
}

/// 候选任务查询
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskQuery {
    pub owner_id: i64,
    pub scope: OptimizationScope,
    pub filters: ScopeFilters,
    /// 指定任务ID时只返回这些任务
    pub task_ids: Option<Vec<i64>>,
    pub offset: u32,
    pub limit: u32,
}

impl TaskQuery {
    pub fn new(owner_id: i64, scope: OptimizationScope, filters: ScopeFilters) -> Self {
        Self {
            owner_id,
            scope,
            filters,
            task_ids: None,
            offset: 0,
            limit: 100,
        }
    }

    pub fn with_task_ids(mut self, task_ids: Option<Vec<i64>>) -> Self {
        self.task_ids = task_ids;
        self
    }

    pub fn page(mut self, offset: u32, limit: u32) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// 查询条件是否包含该任务（不考虑分页）
    pub fn matches(&self, task: &TaskSnapshot, now: DateTime<Utc>) -> bool {
        task.owner_id == self.owner_id
            && self
                .task_ids
                .as_ref()
                .is_none_or(|ids| ids.contains(&task.id))
            && self.scope.matches(task, now)
            && self.filters.matches_task(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn task(status: TaskStatus, due_in_hours: Option<i64>) -> TaskSnapshot {
        let now = Utc::now();
        TaskSnapshot {
            id: 1,
            owner_id: 10,
            title: "写周报".to_string(),
            priority: Priority::Medium,
            status,
            due_date: due_in_hours.map(|h| now + Duration::hours(h)),
            category: Some("work".to_string()),
            project_id: Some(3),
            blocked_tasks: vec![],
            updated_at: now,
        }
    }

    #[test]
    fn test_scope_matching() {
        let now = Utc::now();
        let overdue = task(TaskStatus::Pending, Some(-2));
        assert!(OptimizationScope::Overdue.matches(&overdue, now));
        assert!(OptimizationScope::Pending.matches(&overdue, now));
        assert!(!OptimizationScope::Active.matches(&overdue, now));

        let done = task(TaskStatus::Completed, Some(-2));
        assert!(!OptimizationScope::All.matches(&done, now));
        assert!(!done.is_overdue(now));
    }

    #[test]
    fn test_filters_match_and_overlap() {
        let t = task(TaskStatus::Pending, None);
        let filters = ScopeFilters {
            categories: vec!["work".to_string()],
            ..Default::default()
        };
        assert!(filters.matches_task(&t));

        let other = ScopeFilters {
            categories: vec!["home".to_string()],
            ..Default::default()
        };
        assert!(!other.matches_task(&t));
        assert!(!filters.overlaps(&other));
        assert!(filters.overlaps(&ScopeFilters::default()));
    }

    #[test]
    fn test_query_restricts_task_ids() {
        let now = Utc::now();
        let t = task(TaskStatus::InProgress, Some(5));
        let query = TaskQuery::new(10, OptimizationScope::All, ScopeFilters::default())
            .with_task_ids(Some(vec![2, 3]));
        assert!(!query.matches(&t, now));

        let query = query.with_task_ids(Some(vec![1]));
        assert!(query.matches(&t, now));
    }
}
