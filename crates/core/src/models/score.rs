use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Priority;

/// 五个子评分，均在 [0,1] 区间
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct SubScores {
    pub urgency_score: f64,
    pub importance_score: f64,
    pub context_score: f64,
    pub pattern_score: f64,
    pub dependency_score: f64,
}

/// 一次评分事件的记录
///
/// 同一 (task, owner) 任意时刻只有一行 `is_current = true`。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskPriorityScore {
    pub id: i64,
    pub task_id: i64,
    pub owner_id: i64,
    pub job_id: Option<i64>,
    pub calculated_priority: Priority,
    pub priority_score: f64,
    pub confidence_level: f64,
    #[serde(flatten)]
    pub sub_scores: SubScores,
    pub is_current: bool,
    pub calculated_at: DateTime<Utc>,
}

impl TaskPriorityScore {
    /// 排序依据：综合评分 × 置信度
    pub fn impact(&self) -> f64 {
        self.priority_score * self.confidence_level
    }
}
