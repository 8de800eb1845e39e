use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 调度协调器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub enabled: bool,
    pub scan_interval_seconds: u64,
    /// on_change 调度两次触发之间的最小间隔
    pub on_change_cooldown_seconds: i64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_seconds: 30,
            on_change_cooldown_seconds: 300,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scan_interval_seconds == 0 {
            return Err(anyhow::anyhow!("扫描间隔必须大于0"));
        }
        if self.on_change_cooldown_seconds < 0 {
            return Err(anyhow::anyhow!("on_change 冷却时间不能为负数"));
        }
        Ok(())
    }
}

/// 作业执行配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub page_size: u32,
    pub scoring_concurrency: usize,
    pub apply_concurrency: usize,
    pub retry_backoff_ms: u64,
    pub max_error_details: usize,
    pub progress_update_every: u32,
    pub job_timeout_seconds: u64,
    /// 单次运行最大变更数的上限
    pub max_changes_ceiling: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            queue_capacity: 64,
            page_size: 100,
            scoring_concurrency: 8,
            apply_concurrency: 4,
            retry_backoff_ms: 200,
            max_error_details: 50,
            progress_update_every: 10,
            job_timeout_seconds: 300,
            max_changes_ceiling: 100,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_count == 0 {
            return Err(anyhow::anyhow!("Worker数量必须大于0"));
        }
        if self.queue_capacity == 0 {
            return Err(anyhow::anyhow!("作业队列容量必须大于0"));
        }
        if self.page_size == 0 {
            return Err(anyhow::anyhow!("分页大小必须大于0"));
        }
        if self.scoring_concurrency == 0 || self.apply_concurrency == 0 {
            return Err(anyhow::anyhow!("并发度必须大于0"));
        }
        if self.progress_update_every == 0 {
            return Err(anyhow::anyhow!("进度更新间隔必须大于0"));
        }
        if self.job_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("作业超时时间必须大于0"));
        }
        if self.max_changes_ceiling == 0 {
            return Err(anyhow::anyhow!("最大变更数上限必须大于0"));
        }
        Ok(())
    }
}

/// 评分参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// 没有截止时间的任务的紧急度基线
    pub undated_urgency: f64,
    /// 距离截止时间超过该小时数时紧急度为0
    pub urgency_horizon_hours: f64,
    /// 信号样本数达到该值时置信度为1
    pub full_confidence_samples: u32,
    /// 触发规则数少于该值时按比例降低置信度
    pub min_fired_rules: usize,
    /// 分类重要度权重
    pub category_weights: HashMap<String, f64>,
    /// 项目重要度权重，键为项目ID
    pub project_weights: HashMap<String, f64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            undated_urgency: 0.2,
            urgency_horizon_hours: 168.0,
            full_confidence_samples: 20,
            min_fired_rules: 2,
            category_weights: HashMap::new(),
            project_weights: HashMap::new(),
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.undated_urgency) {
            return Err(anyhow::anyhow!("undated_urgency 必须在 [0,1] 区间内"));
        }
        if !self.urgency_horizon_hours.is_finite() || self.urgency_horizon_hours <= 72.0 {
            return Err(anyhow::anyhow!("urgency_horizon_hours 必须大于72"));
        }
        if self.full_confidence_samples == 0 {
            return Err(anyhow::anyhow!("full_confidence_samples 必须大于0"));
        }
        if self.min_fired_rules == 0 {
            return Err(anyhow::anyhow!("min_fired_rules 必须大于0"));
        }
        for (name, weight) in self.category_weights.iter().chain(self.project_weights.iter()) {
            if !(0.0..=1.0).contains(weight) {
                return Err(anyhow::anyhow!("重要度权重 {name} 必须在 [0,1] 区间内"));
            }
        }
        Ok(())
    }

    pub fn category_weight(&self, category: &str) -> Option<f64> {
        self.category_weights.get(category).copied()
    }

    pub fn project_weight(&self, project_id: i64) -> Option<f64> {
        self.project_weights.get(&project_id.to_string()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(CoordinatorConfig::default().validate().is_ok());
        assert!(WorkerConfig::default().validate().is_ok());
        assert!(ScoringConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut worker = WorkerConfig::default();
        worker.worker_count = 0;
        assert!(worker.validate().is_err());

        let mut scoring = ScoringConfig::default();
        scoring.category_weights.insert("work".to_string(), 1.5);
        assert!(scoring.validate().is_err());
    }
}
