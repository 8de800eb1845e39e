//! 结构化日志工具
//!
//! 为作业生命周期、优先级变更和调度触发输出带 `event` 字段的日志记录，
//! 便于在JSON日志中按事件类型检索。

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use optimizer_core::models::{OptimizationJob, Priority};

pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_job_started(job: &OptimizationJob) {
        info!(
            event = "job_started",
            job.id = job.id,
            job.owner_id = job.owner_id,
            job.schedule_id = ?job.schedule_id,
            job.trigger = job.trigger.as_str(),
            job.max_changes = job.parameters.max_changes_per_run,
            job.min_confidence = job.parameters.min_confidence_threshold,
            "Optimization job started"
        );
    }

    pub fn log_job_completed(job: &OptimizationJob, deferred: usize) {
        info!(
            event = "job_completed",
            job.id = job.id,
            job.owner_id = job.owner_id,
            job.tasks_analyzed = job.tasks_analyzed,
            job.priorities_changed = job.priorities_changed,
            job.deferred = deferred,
            job.errors_count = job.errors_count,
            job.duration_ms = ?job.execution_duration_ms(),
            "Optimization job completed"
        );
    }

    pub fn log_job_failed(job: &OptimizationJob, reason: &str) {
        error!(
            event = "job_failed",
            job.id = job.id,
            job.owner_id = job.owner_id,
            job.tasks_analyzed = job.tasks_analyzed,
            job.priorities_changed = job.priorities_changed,
            job.errors_count = job.errors_count,
            error.message = reason,
            "Optimization job failed"
        );
    }

    pub fn log_priority_changed(
        job_id: i64,
        task_id: i64,
        old_priority: Priority,
        new_priority: Priority,
        priority_score: f64,
        confidence_level: f64,
    ) {
        info!(
            event = "priority_changed",
            job.id = job_id,
            task.id = task_id,
            task.old_priority = old_priority.as_str(),
            task.new_priority = new_priority.as_str(),
            score = priority_score,
            confidence = confidence_level,
            "Task priority changed"
        );
    }

    pub fn log_task_error(job_id: i64, task_id: i64, error_type: &str, message: &str) {
        warn!(
            event = "task_error",
            job.id = job_id,
            task.id = task_id,
            error.type = error_type,
            error.message = message,
            "Task optimization failed"
        );
    }

    pub fn log_schedule_triggered(
        schedule_id: i64,
        owner_id: i64,
        job_id: i64,
        next_run_at: Option<DateTime<Utc>>,
    ) {
        info!(
            event = "schedule_triggered",
            schedule.id = schedule_id,
            schedule.owner_id = owner_id,
            job.id = job_id,
            schedule.next_run_at = ?next_run_at,
            "Schedule triggered optimization job"
        );
    }

    pub fn log_schedule_skipped(schedule_id: i64, active_job_id: i64) {
        warn!(
            event = "schedule_skipped",
            schedule.id = schedule_id,
            job.id = active_job_id,
            "Schedule still has an active job, skipping this trigger"
        );
    }

    pub fn log_system_error(component: &str, operation: &str, error: &dyn std::error::Error) {
        error!(
            event = "system_error",
            component = component,
            operation = operation,
            error.message = %error,
            "System error occurred"
        );
    }
}
