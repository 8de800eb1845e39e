use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 优化效果统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PriorityOptimizationStats {
    pub total_optimizations: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub reverted: u64,
    pub pending_feedback: u64,
    /// accepted / (accepted + rejected)，无反馈时为0
    pub acceptance_rate: f64,
    pub average_confidence: f64,
    pub active_rules: u64,
    pub active_schedules: u64,
    pub total_jobs: u64,
    pub failed_jobs: u64,
    pub last_optimization_at: Option<DateTime<Utc>>,
}
