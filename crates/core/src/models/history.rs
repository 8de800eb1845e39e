use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AppliedRuleSnapshot, Priority};

/// 优先级变更的审计记录
///
/// 除反馈字段（各自只写一次）外不可修改。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizationHistory {
    pub id: i64,
    pub owner_id: i64,
    pub task_id: i64,
    pub job_id: Option<i64>,
    pub old_priority: Priority,
    pub new_priority: Priority,
    pub priority_score: f64,
    pub confidence_level: f64,
    pub reasoning: String,
    pub applied_rules: Vec<AppliedRuleSnapshot>,
    pub user_accepted: Option<bool>,
    pub user_feedback: Option<String>,
    pub feedback_at: Option<DateTime<Utc>>,
    pub reverted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OptimizationHistory {
    pub fn has_feedback(&self) -> bool {
        self.user_accepted.is_some()
    }

    pub fn is_reverted(&self) -> bool {
        self.reverted_at.is_some()
    }
}
