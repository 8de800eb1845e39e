//! # 优化服务
//!
//! 对外暴露的应用层入口，HTTP处理器只依赖这里。负责组装规则注册表、
//! 调度管理、协调器、作业处理器、工作池、反馈和统计，并提供：
//!
//! - 只读推荐（不落库）
//! - 同步执行的手动优化
//! - 规则、调度、作业、历史的管理
//! - 反馈、回滚和统计

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use optimizer_core::config::{CoordinatorConfig, ScoringConfig, WorkerConfig};
use optimizer_core::models::{
    JobErrorDetail, JobParameters, JobTrigger, OptimizationAggressiveness, OptimizationHistory,
    OptimizationJob, OptimizationRule, OptimizationSchedule, OptimizationScope,
    PriorityOptimizationStats, PriorityRecommendation, ScheduleState, ScopeFilters,
    TaskOptimizationResult, TaskQuery, TaskSnapshot,
};
use optimizer_core::traits::{ActivityLog, HistoryRepository, JobRepository, SignalAggregator};
use optimizer_core::{OptimizerError, OptimizerResult};
use optimizer_domain::{
    FeedbackTracker, PriorityScorer, RecommendationBuilder, RuleDeletion, RuleDraft, RuleRegistry,
    StatsService,
};
use optimizer_infrastructure::{MetricsCollector, Repositories};
use optimizer_worker::{
    fetch_all_pages, JobProcessor, ProcessorSettings, ScheduleLeases, WorkerPool,
};

use crate::coordinator::Coordinator;
use crate::schedule_manager::{ScheduleDraft, ScheduleManager};

/// 单个任务的错误
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskError {
    pub task_id: i64,
    pub error_type: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationBatch {
    pub recommendations: Vec<PriorityRecommendation>,
    pub errors: Vec<TaskError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeRequest {
    #[serde(default)]
    pub task_ids: Option<Vec<i64>>,
    pub max_changes: u32,
    pub min_confidence: f64,
    #[serde(default)]
    pub aggressiveness: Option<OptimizationAggressiveness>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeResponse {
    pub job: OptimizationJob,
    pub results: Vec<TaskOptimizationResult>,
    pub errors: Vec<JobErrorDetail>,
}

pub struct OptimizationService {
    repos: Repositories,
    rules: RuleRegistry,
    schedules: Arc<ScheduleManager>,
    coordinator: Arc<Coordinator>,
    processor: Arc<JobProcessor>,
    pool: Arc<WorkerPool>,
    feedback: FeedbackTracker,
    stats: StatsService,
    scorer: PriorityScorer,
    metrics: Arc<MetricsCollector>,
    page_size: u32,
}

impl OptimizationService {
    /// 组装服务并启动工作池，需要在tokio运行时内调用
    pub fn new(
        repos: Repositories,
        activity_log: Arc<dyn ActivityLog>,
        worker: &WorkerConfig,
        coordinator: &CoordinatorConfig,
        scoring: ScoringConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let scorer = PriorityScorer::new(scoring);
        let processor = Arc::new(JobProcessor::new(
            &repos,
            activity_log.clone(),
            scorer.clone(),
            ProcessorSettings::from(worker),
            ScheduleLeases::new(),
            metrics.clone(),
        ));
        let pool = WorkerPool::start(
            processor.clone(),
            worker.worker_count,
            worker.queue_capacity,
            metrics.clone(),
        );
        let schedules = Arc::new(ScheduleManager::new(
            repos.schedules.clone(),
            repos.jobs.clone(),
            pool.registry(),
            worker.max_changes_ceiling,
            coordinator.on_change_cooldown_seconds,
        ));
        let coordinator = Arc::new(Coordinator::new(
            schedules.clone(),
            repos.schedules.clone(),
            repos.jobs.clone(),
            pool.clone(),
            metrics.clone(),
            Duration::from_secs(coordinator.scan_interval_seconds),
        ));

        Self {
            rules: RuleRegistry::new(repos.rules.clone(), repos.history.clone()),
            feedback: FeedbackTracker::new(
                repos.history.clone(),
                repos.rules.clone(),
                repos.tasks.clone(),
                activity_log,
            ),
            stats: StatsService::new(
                repos.history.clone(),
                repos.rules.clone(),
                repos.schedules.clone(),
                repos.jobs.clone(),
            ),
            schedules,
            coordinator,
            processor,
            pool,
            scorer,
            metrics,
            page_size: worker.page_size.max(1),
            repos,
        }
    }

    pub fn coordinator(&self) -> Arc<Coordinator> {
        self.coordinator.clone()
    }

    pub fn pool(&self) -> Arc<WorkerPool> {
        self.pool.clone()
    }

    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    // ---- 推荐与优化 ----

    /// 只读评分，返回按 评分×置信度 排序的推荐
    pub async fn recommendations(
        &self,
        owner_id: i64,
        task_ids: Option<Vec<i64>>,
        limit: usize,
    ) -> OptimizerResult<RecommendationBatch> {
        if limit == 0 {
            return Err(OptimizerError::Validation("limit 必须大于0".to_string()));
        }

        let query = TaskQuery::new(owner_id, OptimizationScope::All, ScopeFilters::default())
            .with_task_ids(task_ids);
        let tasks = self.load_tasks(&query).await?;
        let rules = self
            .rules
            .active_rules_for(owner_id, &ScopeFilters::default())
            .await?;

        let now = Utc::now();
        let mut recommendations = Vec::with_capacity(tasks.len());
        let mut errors = Vec::new();
        for task in &tasks {
            match self.repos.signals.signals_for(owner_id, task.id).await {
                Ok(signals) => {
                    let outcome = self.scorer.score(task, &signals, &rules, now);
                    recommendations.push(RecommendationBuilder::build(task, &outcome));
                }
                Err(e) => {
                    warn!(owner_id, task_id = task.id, error = %e, "Failed to load task signals");
                    errors.push(TaskError {
                        task_id: task.id,
                        error_type: e.kind().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let recommendations = RecommendationBuilder::rank(recommendations, limit);
        self.metrics
            .record_recommendations(recommendations.len() as u64);
        Ok(RecommendationBatch {
            recommendations,
            errors,
        })
    }

    /// 立即执行一次手动优化并等待结束
    pub async fn optimize(
        &self,
        owner_id: i64,
        request: OptimizeRequest,
    ) -> OptimizerResult<OptimizeResponse> {
        let ceiling = self.schedules.max_changes_ceiling();
        if request.max_changes == 0 || request.max_changes > ceiling {
            return Err(OptimizerError::Validation(format!(
                "max_changes 必须在 1 到 {ceiling} 之间"
            )));
        }
        if !(0.0..=1.0).contains(&request.min_confidence) {
            return Err(OptimizerError::Validation(
                "min_confidence 必须在 [0,1] 区间内".to_string(),
            ));
        }

        let aggressiveness = request.aggressiveness.unwrap_or_default();
        let (max_changes_per_run, min_confidence_threshold) =
            aggressiveness.adjust(request.max_changes, request.min_confidence, ceiling);
        let parameters = JobParameters {
            scope: OptimizationScope::All,
            filters: ScopeFilters::default(),
            task_ids: request.task_ids,
            max_changes_per_run,
            min_confidence_threshold,
        };
        let job = self
            .repos
            .jobs
            .create(&OptimizationJob::new(
                owner_id,
                None,
                JobTrigger::Manual,
                parameters,
            ))
            .await?;

        // 在独立任务中执行，调用方（例如超时的HTTP请求）被丢弃时作业仍会正常结束
        let registry = self.pool.registry();
        let processor = self.processor.clone();
        let handle = tokio::spawn(async move {
            let job_id = job.id;
            let cancel = registry.register(job_id).await;
            let outcome = processor.run_job(job, cancel).await;
            registry.unregister(job_id).await;
            outcome
        });

        let result = handle
            .await
            .map_err(|e| OptimizerError::Internal(format!("优化作业执行异常: {e}")))??;
        Ok(OptimizeResponse {
            errors: result.job.error_details.clone(),
            job: result.job,
            results: result.results,
        })
    }

    // ---- 规则 ----

    pub async fn create_rule(
        &self,
        owner_id: i64,
        draft: RuleDraft,
    ) -> OptimizerResult<OptimizationRule> {
        self.rules.create(owner_id, draft).await
    }

    pub async fn get_rule(&self, owner_id: i64, id: i64) -> OptimizerResult<OptimizationRule> {
        self.rules.get(owner_id, id).await
    }

    pub async fn list_rules(&self, owner_id: i64) -> OptimizerResult<Vec<OptimizationRule>> {
        self.rules.list(owner_id).await
    }

    pub async fn update_rule(
        &self,
        owner_id: i64,
        id: i64,
        draft: RuleDraft,
    ) -> OptimizerResult<OptimizationRule> {
        self.rules.update(owner_id, id, draft).await
    }

    pub async fn set_rule_active(
        &self,
        owner_id: i64,
        id: i64,
        is_active: bool,
    ) -> OptimizerResult<OptimizationRule> {
        self.rules.set_active(owner_id, id, is_active).await
    }

    pub async fn delete_rule(&self, owner_id: i64, id: i64) -> OptimizerResult<RuleDeletion> {
        self.rules.delete(owner_id, id).await
    }

    // ---- 调度 ----

    pub async fn create_schedule(
        &self,
        owner_id: i64,
        draft: ScheduleDraft,
    ) -> OptimizerResult<OptimizationSchedule> {
        self.schedules.create(owner_id, draft).await
    }

    pub async fn get_schedule(
        &self,
        owner_id: i64,
        id: i64,
    ) -> OptimizerResult<OptimizationSchedule> {
        self.schedules.get(owner_id, id).await
    }

    pub async fn list_schedules(&self, owner_id: i64) -> OptimizerResult<Vec<OptimizationSchedule>> {
        self.schedules.list(owner_id).await
    }

    pub async fn update_schedule(
        &self,
        owner_id: i64,
        id: i64,
        draft: ScheduleDraft,
    ) -> OptimizerResult<OptimizationSchedule> {
        self.schedules.update(owner_id, id, draft).await
    }

    pub async fn set_schedule_active(
        &self,
        owner_id: i64,
        id: i64,
        is_active: bool,
    ) -> OptimizerResult<OptimizationSchedule> {
        self.schedules.set_active(owner_id, id, is_active).await
    }

    pub async fn delete_schedule(&self, owner_id: i64, id: i64) -> OptimizerResult<()> {
        self.schedules.delete(owner_id, id).await
    }

    pub async fn schedule_state(&self, owner_id: i64, id: i64) -> OptimizerResult<ScheduleState> {
        let schedule = self.schedules.get(owner_id, id).await?;
        self.schedules.state(&schedule, Utc::now()).await
    }

    /// 立即运行调度，作业提交到工作池后返回
    pub async fn run_schedule_now(
        &self,
        owner_id: i64,
        id: i64,
    ) -> OptimizerResult<OptimizationJob> {
        let mut schedule = self.schedules.get(owner_id, id).await?;
        if !schedule.is_active {
            return Err(OptimizerError::Validation(format!("调度 {id} 已停用")));
        }
        if self.repos.jobs.find_active_for_schedule(id).await?.is_some() {
            return Err(OptimizerError::JobAlreadyActive { schedule_id: id });
        }
        self.coordinator
            .launch(&mut schedule, JobTrigger::Manual, Utc::now())
            .await
    }

    /// 任务变更通知，触发匹配的 on_change 调度
    pub async fn notify_task_changed(
        &self,
        task: &TaskSnapshot,
    ) -> OptimizerResult<Vec<OptimizationJob>> {
        self.coordinator.notify_task_changed(task, Utc::now()).await
    }

    // ---- 作业 ----

    pub async fn get_job(&self, owner_id: i64, id: i64) -> OptimizerResult<OptimizationJob> {
        self.repos
            .jobs
            .get_by_id(id)
            .await?
            .filter(|job| job.owner_id == owner_id)
            .ok_or(OptimizerError::JobNotFound { id })
    }

    pub async fn list_jobs(
        &self,
        owner_id: i64,
        limit: Option<u32>,
    ) -> OptimizerResult<Vec<OptimizationJob>> {
        self.repos.jobs.list(owner_id, limit).await
    }

    /// 以相同参数创建新作业重试，原作业保持不变
    pub async fn retry_job(&self, owner_id: i64, id: i64) -> OptimizerResult<OptimizationJob> {
        let previous = self.get_job(owner_id, id).await?;
        if !previous.is_finished() {
            return Err(OptimizerError::Validation(format!(
                "作业 {id} 尚未结束，不能重试"
            )));
        }
        if let Some(schedule_id) = previous.schedule_id {
            if self
                .repos
                .jobs
                .find_active_for_schedule(schedule_id)
                .await?
                .is_some()
            {
                return Err(OptimizerError::JobAlreadyActive { schedule_id });
            }
        }

        let job = self
            .repos
            .jobs
            .create(&OptimizationJob::retry_from(&previous))
            .await?;
        info!(owner_id, job_id = job.id, retry_of = id, "Retrying optimization job");
        self.pool.submit(job.clone()).await?;
        Ok(job)
    }

    /// 取消作业；已应用的变更不会回滚
    pub async fn cancel_job(&self, owner_id: i64, id: i64) -> OptimizerResult<OptimizationJob> {
        let mut job = self.get_job(owner_id, id).await?;
        if !job.is_active() {
            return Err(OptimizerError::Validation(format!("作业 {id} 已结束")));
        }

        if !self.pool.cancel(id).await {
            // 工作池中没有该作业（例如进程重启前遗留的待执行作业）
            self.processor
                .fail_job(&mut job, "cancelled", "cancelled")
                .await?;
            return Ok(job);
        }
        self.get_job(owner_id, id).await
    }

    // ---- 历史、反馈与统计 ----

    pub async fn history(
        &self,
        owner_id: i64,
        limit: Option<u32>,
    ) -> OptimizerResult<Vec<OptimizationHistory>> {
        self.repos.history.list(owner_id, limit).await
    }

    pub async fn record_feedback(
        &self,
        owner_id: i64,
        history_id: i64,
        accepted: bool,
        feedback: Option<String>,
    ) -> OptimizerResult<OptimizationHistory> {
        self.feedback
            .record_feedback(owner_id, history_id, accepted, feedback)
            .await
    }

    pub async fn revert(&self, owner_id: i64, history_id: i64) -> OptimizerResult<OptimizationHistory> {
        self.feedback.revert(owner_id, history_id).await
    }

    pub async fn stats(&self, owner_id: i64) -> OptimizerResult<PriorityOptimizationStats> {
        self.stats.stats(owner_id).await
    }

    async fn load_tasks(&self, query: &TaskQuery) -> OptimizerResult<Vec<TaskSnapshot>> {
        let mut tasks = fetch_all_pages(self.repos.tasks.as_ref(), query, self.page_size).await?;
        tasks.retain(|t| t.is_open());
        Ok(tasks)
    }
}
