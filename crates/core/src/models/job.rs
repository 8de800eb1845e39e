use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OptimizationScope, ScopeFilters};
use crate::errors::OptimizerError;

/// 作业状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(OptimizerError::Validation(format!("无效的作业状态: {s}"))),
        }
    }
}

crate::impl_sqlite_text_enum!(JobStatus);

/// 作业触发来源
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobTrigger {
    Scheduled,
    Manual,
    OnChange,
    Retry,
}

impl JobTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobTrigger::Scheduled => "scheduled",
            JobTrigger::Manual => "manual",
            JobTrigger::OnChange => "on_change",
            JobTrigger::Retry => "retry",
        }
    }
}

impl FromStr for JobTrigger {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(JobTrigger::Scheduled),
            "manual" => Ok(JobTrigger::Manual),
            "on_change" => Ok(JobTrigger::OnChange),
            "retry" => Ok(JobTrigger::Retry),
            _ => Err(OptimizerError::Validation(format!("无效的作业触发类型: {s}"))),
        }
    }
}

crate::impl_sqlite_text_enum!(JobTrigger);

/// 作业运行参数，创建时固定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobParameters {
    pub scope: OptimizationScope,
    #[serde(default)]
    pub filters: ScopeFilters,
    #[serde(default)]
    pub task_ids: Option<Vec<i64>>,
    pub max_changes_per_run: u32,
    pub min_confidence_threshold: f64,
}

impl Default for JobParameters {
    fn default() -> Self {
        Self {
            scope: OptimizationScope::All,
            filters: ScopeFilters::default(),
            task_ids: None,
            max_changes_per_run: 10,
            min_confidence_threshold: 0.5,
        }
    }
}

/// 作业错误详情
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobErrorDetail {
    pub task_id: Option<i64>,
    pub error_type: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl JobErrorDetail {
    pub fn new(task_id: Option<i64>, error_type: &str, message: impl Into<String>) -> Self {
        Self {
            task_id,
            error_type: error_type.to_string(),
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// 一次优化执行实例
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizationJob {
    pub id: i64,
    pub owner_id: i64,
    pub schedule_id: Option<i64>,
    pub trigger: JobTrigger,
    pub parameters: JobParameters,
    pub status: JobStatus,
    pub tasks_analyzed: u32,
    pub priorities_changed: u32,
    pub errors_count: u32,
    pub error_details: Vec<JobErrorDetail>,
    pub progress_percentage: f64,
    pub current_task_id: Option<i64>,
    pub retry_of: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl OptimizationJob {
    pub fn new(
        owner_id: i64,
        schedule_id: Option<i64>,
        trigger: JobTrigger,
        parameters: JobParameters,
    ) -> Self {
        Self {
            id: 0, // 将由数据库生成
            owner_id,
            schedule_id,
            trigger,
            parameters,
            status: JobStatus::Pending,
            tasks_analyzed: 0,
            priorities_changed: 0,
            errors_count: 0,
            error_details: vec![],
            progress_percentage: 0.0,
            current_task_id: None,
            retry_of: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// 基于已有作业创建重试作业（新行，不复用旧作业）
    pub fn retry_from(previous: &OptimizationJob) -> Self {
        let mut job = Self::new(
            previous.owner_id,
            previous.schedule_id,
            JobTrigger::Retry,
            previous.parameters.clone(),
        );
        job.retry_of = Some(previous.id);
        job
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, JobStatus::Pending | JobStatus::Running)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn update_status(&mut self, status: JobStatus) {
        self.status = status;
        match status {
            JobStatus::Running => {
                if self.started_at.is_none() {
                    self.started_at = Some(Utc::now());
                }
            }
            JobStatus::Completed | JobStatus::Failed => {
                if self.completed_at.is_none() {
                    self.completed_at = Some(Utc::now());
                }
            }
            JobStatus::Pending => {}
        }
    }

    /// 记录一个错误；详情列表超过上限后只累加计数
    pub fn push_error(&mut self, detail: JobErrorDetail, max_details: usize) {
        self.errors_count += 1;
        if self.error_details.len() < max_details {
            self.error_details.push(detail);
        }
    }

    pub fn execution_duration_ms(&self) -> Option<i64> {
        if let (Some(started), Some(completed)) = (self.started_at, self.completed_at) {
            Some((completed - started).num_milliseconds())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_set_timestamps() {
        let mut job = OptimizationJob::new(1, None, JobTrigger::Manual, JobParameters::default());
        assert!(job.is_active());
        job.update_status(JobStatus::Running);
        assert!(job.started_at.is_some());
        job.update_status(JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert!(job.is_finished());
        assert!(job.execution_duration_ms().unwrap() >= 0);
    }

    #[test]
    fn test_error_details_are_capped() {
        let mut job = OptimizationJob::new(1, None, JobTrigger::Manual, JobParameters::default());
        for i in 0..5 {
            job.push_error(JobErrorDetail::new(Some(i), "persistence", "写入失败"), 3);
        }
        assert_eq!(job.errors_count, 5);
        assert_eq!(job.error_details.len(), 3);
    }

    #[test]
    fn test_retry_creates_new_job() {
        let mut job = OptimizationJob::new(1, Some(4), JobTrigger::Scheduled, JobParameters::default());
        job.id = 9;
        job.update_status(JobStatus::Failed);

        let retry = OptimizationJob::retry_from(&job);
        assert_eq!(retry.id, 0);
        assert_eq!(retry.retry_of, Some(9));
        assert_eq!(retry.trigger, JobTrigger::Retry);
        assert_eq!(retry.status, JobStatus::Pending);
        assert_eq!(retry.schedule_id, Some(4));
    }
}
