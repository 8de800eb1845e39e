//! # 作业处理器
//!
//! 执行一次优化作业：加载规则和候选任务、逐个评分并持久化当前评分、
//! 按 评分×置信度 选出本次可修改的任务并写回优先级。
//!
//! ## 执行流程
//!
//! ```text
//! 获取调度租约 → 标记运行中 → 加载规则/候选任务 → 排序
//!     → 评分(有界并发) → 分类 → 排序暂存变更 → 应用前N个 → 其余延后
//!     → 完成 / 失败(取消、超时)
//! ```
//!
//! 单个任务的失败（评分持久化、优先级写回、历史写入）会在退避后重试一次，
//! 仍失败则计入作业错误，不影响其他任务；候选任务枚举失败则整个作业失败。

use std::cmp::Ordering;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use optimizer_core::config::WorkerConfig;
use optimizer_core::models::{
    ActivityEvent, ActivityKind, JobErrorDetail, JobStatus, OptimizationHistory, OptimizationJob,
    OptimizationRule, TaskOptimizationResult, TaskOutcome, TaskQuery, TaskSnapshot,
};
use optimizer_core::traits::{
    ActivityLog, HistoryRepository, JobRepository, ScoreRepository, SignalAggregator, TaskStore,
};
use optimizer_core::{OptimizerError, OptimizerResult};
use optimizer_domain::{PriorityScorer, RecommendationBuilder, RuleRegistry, ScoreOutcome};
use optimizer_infrastructure::{MetricsCollector, Repositories, StructuredLogger};

use crate::cancellation::CancellationFlag;
use crate::lease::ScheduleLeases;

/// 作业处理参数，由 `WorkerConfig` 转换而来
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub page_size: u32,
    pub scoring_concurrency: usize,
    pub apply_concurrency: usize,
    pub retry_backoff: Duration,
    pub max_error_details: usize,
    pub progress_update_every: u32,
    pub job_timeout: Duration,
}

impl From<&WorkerConfig> for ProcessorSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            scoring_concurrency: config.scoring_concurrency.max(1),
            apply_concurrency: config.apply_concurrency.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            max_error_details: config.max_error_details,
            progress_update_every: config.progress_update_every.max(1),
            job_timeout: Duration::from_secs(config.job_timeout_seconds),
        }
    }
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

/// 作业执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job: OptimizationJob,
    pub results: Vec<TaskOptimizationResult>,
}

impl JobResult {
    pub fn count(&self, outcome: TaskOutcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }
}

/// 作业提前结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Cancelled,
    TimedOut,
}

impl StopReason {
    fn detail(&self) -> JobErrorDetail {
        match self {
            StopReason::Cancelled => JobErrorDetail::new(None, "cancelled", "cancelled"),
            StopReason::TimedOut => JobErrorDetail::new(None, "timeout", "timed out"),
        }
    }
}

/// 等待应用的优先级变更
struct StagedChange<'a> {
    task: &'a TaskSnapshot,
    outcome: ScoreOutcome,
}

pub struct JobProcessor {
    rule_registry: RuleRegistry,
    scorer: PriorityScorer,
    score_repo: Arc<dyn ScoreRepository>,
    history_repo: Arc<dyn HistoryRepository>,
    job_repo: Arc<dyn JobRepository>,
    task_store: Arc<dyn TaskStore>,
    signal_aggregator: Arc<dyn SignalAggregator>,
    activity_log: Arc<dyn ActivityLog>,
    leases: ScheduleLeases,
    metrics: Arc<MetricsCollector>,
    settings: ProcessorSettings,
}

impl JobProcessor {
    pub fn new(
        repos: &Repositories,
        activity_log: Arc<dyn ActivityLog>,
        scorer: PriorityScorer,
        settings: ProcessorSettings,
        leases: ScheduleLeases,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            rule_registry: RuleRegistry::new(repos.rules.clone(), repos.history.clone()),
            scorer,
            score_repo: repos.scores.clone(),
            history_repo: repos.history.clone(),
            job_repo: repos.jobs.clone(),
            task_store: repos.tasks.clone(),
            signal_aggregator: repos.signals.clone(),
            activity_log,
            leases,
            metrics,
            settings,
        }
    }

    pub fn leases(&self) -> &ScheduleLeases {
        &self.leases
    }

    /// 执行作业
    ///
    /// 取消和超时会让作业以失败状态结束并返回 `Ok`；租约冲突和候选任务
    /// 枚举失败在持久化失败状态后返回错误。
    pub async fn run_job(
        &self,
        mut job: OptimizationJob,
        cancel: CancellationFlag,
    ) -> OptimizerResult<JobResult> {
        let _lease = match job.schedule_id {
            Some(schedule_id) => match self.leases.try_acquire(schedule_id) {
                Some(guard) => Some(guard),
                None => {
                    self.fail_job(&mut job, "conflict", "another job is active for this schedule")
                        .await?;
                    return Err(OptimizerError::JobAlreadyActive { schedule_id });
                }
            },
            None => None,
        };

        let started = Instant::now();
        let deadline = started + self.settings.job_timeout;
        job.update_status(JobStatus::Running);
        self.job_repo.update(&job).await?;
        self.metrics.record_job_started();
        StructuredLogger::log_job_started(&job);

        let (rules, candidates) = match self.prepare(&job).await {
            Ok(prepared) => prepared,
            Err(e) => {
                let message = e.to_string();
                self.fail_job(&mut job, "fatal_job", &message).await?;
                self.metrics
                    .record_job_finished(false, started.elapsed().as_secs_f64());
                return Err(OptimizerError::FatalJob(message));
            }
        };

        let now = Utc::now();
        let mut results = Vec::with_capacity(candidates.len());
        let mut staged = Vec::new();
        let mut reported_rules = HashSet::new();
        let mut stop = None;

        {
            let job_id = job.id;
            let rules = rules.as_slice();
            let scoring: Vec<_> = candidates
                .iter()
                .map(|task| self.score_task(job_id, task, rules, now))
                .collect();
            let mut scored = stream::iter(scoring).buffered(self.settings.scoring_concurrency);

            let total = candidates.len();
            let mut processed = 0usize;
            loop {
                if cancel.is_cancelled() {
                    stop = Some(StopReason::Cancelled);
                    break;
                }
                let next = match tokio::time::timeout_at(deadline, scored.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        stop = Some(StopReason::TimedOut);
                        break;
                    }
                };
                let Some((task, outcome)) = next else {
                    break;
                };

                processed += 1;
                job.tasks_analyzed += 1;
                job.current_task_id = Some(task.id);
                self.classify(
                    &mut job,
                    task,
                    outcome,
                    &mut results,
                    &mut staged,
                    &mut reported_rules,
                );

                if processed % self.settings.progress_update_every as usize == 0 {
                    job.progress_percentage = processed as f64 / total as f64 * 100.0;
                    self.save_progress(&job).await;
                }
            }
        }

        if stop.is_none() {
            stop = self
                .apply_staged(&mut job, staged, &mut results, &cancel, deadline)
                .await;
        } else {
            results.extend(staged.iter().map(|change| {
                Self::result_row(change.task, &change.outcome, TaskOutcome::Deferred, None)
            }));
        }

        let deferred = results
            .iter()
            .filter(|r| r.outcome == TaskOutcome::Deferred)
            .count();
        self.metrics.record_tasks_analyzed(u64::from(job.tasks_analyzed));
        self.metrics
            .record_priority_changes(u64::from(job.priorities_changed), deferred as u64);

        match stop {
            Some(reason) => {
                job.push_error(reason.detail(), self.settings.max_error_details);
                job.update_status(JobStatus::Failed);
                self.with_retry("update_job", || self.job_repo.update(&job))
                    .await?;
                StructuredLogger::log_job_failed(&job, &reason.detail().message);
                self.metrics
                    .record_job_finished(false, started.elapsed().as_secs_f64());
            }
            None => {
                job.progress_percentage = 100.0;
                job.update_status(JobStatus::Completed);
                self.with_retry("update_job", || self.job_repo.update(&job))
                    .await?;
                StructuredLogger::log_job_completed(&job, deferred);
                self.metrics
                    .record_job_finished(true, started.elapsed().as_secs_f64());
            }
        }

        Ok(JobResult { job, results })
    }

    /// 将未执行的作业标记为失败
    pub async fn fail_job(
        &self,
        job: &mut OptimizationJob,
        error_type: &str,
        message: &str,
    ) -> OptimizerResult<()> {
        job.push_error(
            JobErrorDetail::new(None, error_type, message),
            self.settings.max_error_details,
        );
        job.update_status(JobStatus::Failed);
        self.job_repo.update(job).await?;
        StructuredLogger::log_job_failed(job, message);
        Ok(())
    }

    /// 加载规则和全部候选任务，并按截止时间排序
    async fn prepare(
        &self,
        job: &OptimizationJob,
    ) -> OptimizerResult<(Vec<OptimizationRule>, Vec<TaskSnapshot>)> {
        let params = &job.parameters;
        let rules = self
            .rule_registry
            .active_rules_for(job.owner_id, &params.filters)
            .await
            .map_err(|e| OptimizerError::FatalJob(format!("加载优化规则失败: {e}")))?;

        let query = TaskQuery::new(job.owner_id, params.scope, params.filters.clone())
            .with_task_ids(params.task_ids.clone());
        let mut candidates =
            fetch_all_pages(self.task_store.as_ref(), &query, self.settings.page_size)
                .await
                .map_err(|e| OptimizerError::FatalJob(format!("候选任务查询失败: {e}")))?;
        candidates.retain(|t| t.is_open());

        sort_candidates(&mut candidates);
        debug!(
            job_id = job.id,
            rules = rules.len(),
            candidates = candidates.len(),
            "Prepared optimization job"
        );
        Ok((rules, candidates))
    }

    /// 获取信号、评分并持久化当前评分
    async fn score_task<'a>(
        &self,
        job_id: i64,
        task: &'a TaskSnapshot,
        rules: &[OptimizationRule],
        now: DateTime<Utc>,
    ) -> (&'a TaskSnapshot, OptimizerResult<ScoreOutcome>) {
        let result = async {
            let signals = self
                .signal_aggregator
                .signals_for(task.owner_id, task.id)
                .await?;
            let outcome = self.scorer.score(task, &signals, rules, now);
            let record = outcome.to_record(Some(job_id), now);
            self.with_retry("save_score", || self.score_repo.save_current(&record))
                .await?;
            Ok(outcome)
        }
        .await;
        (task, result)
    }

    fn classify<'a>(
        &self,
        job: &mut OptimizationJob,
        task: &'a TaskSnapshot,
        outcome: OptimizerResult<ScoreOutcome>,
        results: &mut Vec<TaskOptimizationResult>,
        staged: &mut Vec<StagedChange<'a>>,
        reported_rules: &mut HashSet<i64>,
    ) {
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record_task_error(job, task.id, &e);
                results.push(TaskOptimizationResult {
                    task_id: task.id,
                    outcome: TaskOutcome::Failed,
                    old_priority: task.priority,
                    new_priority: task.priority,
                    priority_score: 0.0,
                    confidence_level: 0.0,
                    history_id: None,
                });
                return;
            }
        };

        // 规则错误对每个任务都会出现，每条规则只记录一次
        for error in &outcome.rule_errors {
            if let OptimizerError::RuleEvaluation { rule_id, .. } = error {
                if reported_rules.insert(*rule_id) {
                    self.metrics.record_rule_evaluation_error();
                    job.push_error(
                        JobErrorDetail::new(None, error.kind(), error.to_string()),
                        self.settings.max_error_details,
                    );
                }
            }
        }

        let min_confidence = job.parameters.min_confidence_threshold;
        let verdict = if !outcome.has_fired_rules() {
            TaskOutcome::NoRules
        } else if outcome.confidence_level < min_confidence {
            TaskOutcome::LowConfidence
        } else if !outcome.is_change() {
            TaskOutcome::Unchanged
        } else {
            staged.push(StagedChange { task, outcome });
            return;
        };
        results.push(Self::result_row(task, &outcome, verdict, None));
    }

    /// 应用评分最高的变更，返回是否提前结束
    async fn apply_staged(
        &self,
        job: &mut OptimizationJob,
        mut staged: Vec<StagedChange<'_>>,
        results: &mut Vec<TaskOptimizationResult>,
        cancel: &CancellationFlag,
        deadline: Instant,
    ) -> Option<StopReason> {
        staged.sort_by(|a, b| {
            b.outcome
                .impact()
                .partial_cmp(&a.outcome.impact())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.task.id.cmp(&b.task.id))
        });

        let limit = (job.parameters.max_changes_per_run as usize).min(staged.len());
        let deferred = staged.split_off(limit);
        let mut stop = None;
        let mut pending = staged.into_iter().peekable();

        while pending.peek().is_some() {
            if cancel.is_cancelled() {
                stop = Some(StopReason::Cancelled);
                break;
            }
            if Instant::now() >= deadline {
                stop = Some(StopReason::TimedOut);
                break;
            }

            let chunk: Vec<StagedChange<'_>> =
                pending.by_ref().take(self.settings.apply_concurrency).collect();
            let job_id = job.id;
            let applied = futures::future::join_all(
                chunk.iter().map(|change| self.apply_change(job_id, change)),
            )
            .await;

            for (change, result) in chunk.iter().zip(applied) {
                match result {
                    Ok(history) => {
                        job.priorities_changed += 1;
                        StructuredLogger::log_priority_changed(
                            job.id,
                            change.task.id,
                            history.old_priority,
                            history.new_priority,
                            history.priority_score,
                            history.confidence_level,
                        );
                        results.push(Self::result_row(
                            change.task,
                            &change.outcome,
                            TaskOutcome::Applied,
                            Some(history.id),
                        ));
                    }
                    Err(e) => {
                        self.record_task_error(job, change.task.id, &e);
                        results.push(Self::result_row(
                            change.task,
                            &change.outcome,
                            TaskOutcome::Failed,
                            None,
                        ));
                    }
                }
            }
        }

        // 提前结束时未应用的变更和超出上限的变更一样记为延后
        for change in pending.chain(deferred) {
            results.push(Self::result_row(
                change.task,
                &change.outcome,
                TaskOutcome::Deferred,
                None,
            ));
        }
        stop
    }

    /// 写回优先级、记录历史并上报活动事件
    async fn apply_change(
        &self,
        job_id: i64,
        change: &StagedChange<'_>,
    ) -> OptimizerResult<OptimizationHistory> {
        let task = change.task;
        let outcome = &change.outcome;

        self.with_retry("set_priority", || {
            self.task_store
                .set_priority(task.owner_id, task.id, outcome.calculated_priority)
        })
        .await?;

        let recommendation = RecommendationBuilder::build(task, outcome);
        let history = OptimizationHistory {
            id: 0,
            owner_id: task.owner_id,
            task_id: task.id,
            job_id: Some(job_id),
            old_priority: task.priority,
            new_priority: outcome.calculated_priority,
            priority_score: outcome.priority_score,
            confidence_level: outcome.confidence_level,
            reasoning: recommendation.reasoning,
            applied_rules: outcome.applied_rules(),
            user_accepted: None,
            user_feedback: None,
            feedback_at: None,
            reverted_at: None,
            created_at: Utc::now(),
        };
        let history = match self
            .with_retry("create_history", || self.history_repo.create(&history))
            .await
        {
            Ok(history) => history,
            Err(e) => {
                // 没有历史记录的变更无法审计和撤销，恢复原优先级
                if let Err(restore) = self
                    .with_retry("restore_priority", || {
                        self.task_store
                            .set_priority(task.owner_id, task.id, task.priority)
                    })
                    .await
                {
                    error!(
                        job_id,
                        task_id = task.id,
                        error = %restore,
                        "Failed to restore priority after history write failure"
                    );
                }
                return Err(e);
            }
        };

        self.activity_log.record(ActivityEvent {
            kind: ActivityKind::PriorityChanged,
            owner_id: task.owner_id,
            task_id: task.id,
            history_id: history.id,
            old_priority: history.old_priority,
            new_priority: history.new_priority,
            occurred_at: history.created_at,
        });
        Ok(history)
    }

    fn record_task_error(&self, job: &mut OptimizationJob, task_id: i64, error: &OptimizerError) {
        let message = error.to_string();
        StructuredLogger::log_task_error(job.id, task_id, error.kind(), &message);
        self.metrics.record_task_error(error.kind());
        job.push_error(
            JobErrorDetail::new(Some(task_id), error.kind(), message),
            self.settings.max_error_details,
        );
    }

    async fn save_progress(&self, job: &OptimizationJob) {
        if let Err(e) = self.job_repo.update(job).await {
            warn!(job_id = job.id, error = %e, "Failed to persist job progress");
        }
    }

    /// 失败后等待退避时间再重试一次
    async fn with_retry<T, F, Fut>(&self, operation: &str, op: F) -> OptimizerResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = OptimizerResult<T>>,
    {
        match op().await {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(
                    operation,
                    error = %e,
                    backoff_ms = self.settings.retry_backoff.as_millis() as u64,
                    "Operation failed, retrying once"
                );
                tokio::time::sleep(self.settings.retry_backoff).await;
                op().await
            }
        }
    }

    fn result_row(
        task: &TaskSnapshot,
        outcome: &ScoreOutcome,
        verdict: TaskOutcome,
        history_id: Option<i64>,
    ) -> TaskOptimizationResult {
        TaskOptimizationResult {
            task_id: task.id,
            outcome: verdict,
            old_priority: task.priority,
            new_priority: outcome.calculated_priority,
            priority_score: outcome.priority_score,
            confidence_level: outcome.confidence_level,
            history_id,
        }
    }
}

/// 截止时间升序，无截止时间的排在最后，相同时按任务ID
pub fn sort_candidates(tasks: &mut [TaskSnapshot]) {
    tasks.sort_by(|a, b| match (a.due_date, b.due_date) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    });
}

/// 分页读取全部候选任务
///
/// 返回行数超过页大小或整页都是已读过的任务时，视为任务存储没有按分页参数返回，停止翻页。
pub async fn fetch_all_pages(
    store: &dyn TaskStore,
    query: &TaskQuery,
    page_size: u32,
) -> OptimizerResult<Vec<TaskSnapshot>> {
    let page_size = page_size.max(1);
    let mut tasks = Vec::new();
    let mut seen = HashSet::new();
    let mut offset = 0;
    loop {
        let page = store.get_tasks(&query.clone().page(offset, page_size)).await?;
        let fetched = page.len();
        let mut fresh = 0usize;
        for task in page {
            if seen.insert(task.id) {
                fresh += 1;
                tasks.push(task);
            }
        }
        if fetched != page_size as usize || fresh == 0 {
            break;
        }
        offset += page_size;
    }
    Ok(tasks)
}
