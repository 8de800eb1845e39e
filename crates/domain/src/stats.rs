//! 优化效果统计

use std::sync::Arc;

use optimizer_core::models::{JobStatus, OptimizationHistory, PriorityOptimizationStats};
use optimizer_core::traits::{HistoryRepository, JobRepository, RuleRepository, ScheduleRepository};
use optimizer_core::OptimizerResult;

pub struct StatsService {
    history_repo: Arc<dyn HistoryRepository>,
    rule_repo: Arc<dyn RuleRepository>,
    schedule_repo: Arc<dyn ScheduleRepository>,
    job_repo: Arc<dyn JobRepository>,
}

impl StatsService {
    pub fn new(
        history_repo: Arc<dyn HistoryRepository>,
        rule_repo: Arc<dyn RuleRepository>,
        schedule_repo: Arc<dyn ScheduleRepository>,
        job_repo: Arc<dyn JobRepository>,
    ) -> Self {
        Self {
            history_repo,
            rule_repo,
            schedule_repo,
            job_repo,
        }
    }

    pub async fn stats(&self, owner_id: i64) -> OptimizerResult<PriorityOptimizationStats> {
        let histories = self.history_repo.list(owner_id, None).await?;
        let mut stats = summarize_history(&histories);

        stats.active_rules = self.rule_repo.list_active(owner_id).await?.len() as u64;
        stats.active_schedules = self
            .schedule_repo
            .list(owner_id)
            .await?
            .iter()
            .filter(|s| s.is_active)
            .count() as u64;
        stats.total_jobs = self.job_repo.count(owner_id, None).await?;
        stats.failed_jobs = self
            .job_repo
            .count(owner_id, Some(JobStatus::Failed))
            .await?;

        Ok(stats)
    }
}

/// 汇总历史记录部分的统计
pub fn summarize_history(histories: &[OptimizationHistory]) -> PriorityOptimizationStats {
    let mut stats = PriorityOptimizationStats {
        total_optimizations: histories.len() as u64,
        ..Default::default()
    };

    for history in histories {
        match history.user_accepted {
            Some(true) => stats.accepted += 1,
            Some(false) => stats.rejected += 1,
            None => stats.pending_feedback += 1,
        }
        if history.is_reverted() {
            stats.reverted += 1;
        }
    }

    let decided = stats.accepted + stats.rejected;
    if decided > 0 {
        stats.acceptance_rate = stats.accepted as f64 / decided as f64;
    }
    if !histories.is_empty() {
        stats.average_confidence = histories.iter().map(|h| h.confidence_level).sum::<f64>()
            / histories.len() as f64;
    }
    stats.last_optimization_at = histories.iter().map(|h| h.created_at).max();

    stats
}
