use serde::{Deserialize, Serialize};

use super::{Priority, SubScores};

/// 推荐理由中的单个影响因素
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationFactor {
    /// 因素名称，例如 `urgency`、`dependency`
    pub factor: String,
    pub score: f64,
    pub description: String,
}

/// 单个任务的优先级推荐（只读，不落库）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriorityRecommendation {
    pub task_id: i64,
    pub task_title: String,
    pub current_priority: Priority,
    pub recommended_priority: Priority,
    pub priority_score: f64,
    pub confidence_level: f64,
    pub sub_scores: SubScores,
    pub reasoning: String,
    pub factors: Vec<RecommendationFactor>,
    pub applied_rules: Vec<String>,
}

impl PriorityRecommendation {
    pub fn is_change(&self) -> bool {
        self.current_priority != self.recommended_priority
    }

    pub fn impact(&self) -> f64 {
        self.priority_score * self.confidence_level
    }
}

/// 单个任务在一次优化运行中的处理结果
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// 已修改优先级
    Applied,
    /// 满足条件但超出单次变更上限
    Deferred,
    /// 置信度低于阈值
    LowConfidence,
    /// 推荐优先级与当前一致
    Unchanged,
    /// 没有规则触发
    NoRules,
    /// 处理失败，见作业错误详情
    Failed,
}

/// 优化运行中单个任务的结果行
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskOptimizationResult {
    pub task_id: i64,
    pub outcome: TaskOutcome,
    pub old_priority: Priority,
    pub new_priority: Priority,
    pub priority_score: f64,
    pub confidence_level: f64,
    pub history_id: Option<i64>,
}
