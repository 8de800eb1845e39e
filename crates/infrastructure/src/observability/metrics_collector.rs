//! 优化引擎的指标收集
//!
//! 指标通过 `metrics` 门面上报，进程启动时安装Prometheus记录器后
//! 即可在 `/metrics` 端点导出；未安装记录器时所有操作都是空操作。

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::debug;

pub struct MetricsCollector {
    // 作业指标
    jobs_started_total: Counter,
    jobs_completed_total: Counter,
    jobs_failed_total: Counter,
    jobs_skipped_total: Counter,
    job_duration: Histogram,

    // 任务指标
    tasks_analyzed_total: Counter,
    priorities_changed_total: Counter,
    changes_deferred_total: Counter,
    rule_evaluation_errors_total: Counter,

    // 运行状态
    queue_depth: Gauge,
    running_jobs: Gauge,
    coordinator_scan_duration: Histogram,
    recommendations_served_total: Counter,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            jobs_started_total: counter!("optimizer_jobs_started_total"),
            jobs_completed_total: counter!("optimizer_jobs_completed_total"),
            jobs_failed_total: counter!("optimizer_jobs_failed_total"),
            jobs_skipped_total: counter!("optimizer_jobs_skipped_total"),
            job_duration: histogram!("optimizer_job_duration_seconds"),
            tasks_analyzed_total: counter!("optimizer_tasks_analyzed_total"),
            priorities_changed_total: counter!("optimizer_priorities_changed_total"),
            changes_deferred_total: counter!("optimizer_changes_deferred_total"),
            rule_evaluation_errors_total: counter!("optimizer_rule_evaluation_errors_total"),
            queue_depth: gauge!("optimizer_queue_depth"),
            running_jobs: gauge!("optimizer_running_jobs"),
            coordinator_scan_duration: histogram!("optimizer_coordinator_scan_duration_seconds"),
            recommendations_served_total: counter!("optimizer_recommendations_served_total"),
        }
    }

    pub fn record_job_started(&self) {
        self.jobs_started_total.increment(1);
        self.running_jobs.increment(1.0);
    }

    /// 记录作业结束，`succeeded` 为 false 表示作业失败
    pub fn record_job_finished(&self, succeeded: bool, duration_seconds: f64) {
        if succeeded {
            self.jobs_completed_total.increment(1);
        } else {
            self.jobs_failed_total.increment(1);
        }
        self.job_duration.record(duration_seconds);
        self.running_jobs.decrement(1.0);

        debug!(succeeded, duration_seconds, "Job metrics recorded");
    }

    /// 调度到期但已有活跃作业
    pub fn record_job_skipped(&self) {
        self.jobs_skipped_total.increment(1);
    }

    pub fn record_tasks_analyzed(&self, count: u64) {
        self.tasks_analyzed_total.increment(count);
    }

    pub fn record_priority_changes(&self, applied: u64, deferred: u64) {
        self.priorities_changed_total.increment(applied);
        self.changes_deferred_total.increment(deferred);
    }

    /// 按错误类型记录单任务错误
    pub fn record_task_error(&self, error_type: &str) {
        counter!("optimizer_task_errors_total", "error_type" => error_type.to_string())
            .increment(1);
    }

    pub fn record_rule_evaluation_error(&self) {
        self.rule_evaluation_errors_total.increment(1);
    }

    pub fn update_queue_depth(&self, depth: f64) {
        self.queue_depth.set(depth);
    }

    pub fn record_scan_duration(&self, duration_seconds: f64) {
        self.coordinator_scan_duration.record(duration_seconds);
    }

    pub fn record_recommendations(&self, count: u64) {
        self.recommendations_served_total.increment(count);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_without_recorder_are_noops() {
        let metrics = MetricsCollector::new();
        metrics.record_job_started();
        metrics.record_job_finished(true, 0.5);
        metrics.record_priority_changes(3, 2);
        metrics.record_task_error("persistence");
        metrics.update_queue_depth(4.0);
    }
}
