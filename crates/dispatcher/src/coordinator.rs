//! # 调度协调器
//!
//! 周期性扫描到期的 daily/hourly 调度，为每个调度创建待执行作业并提交到工作池。
//! 同一调度已有待执行或运行中的作业时跳过本次触发，只推进下次执行时间。
//!
//! 多节点部署时的选主不在这里处理，每个进程只应启用一个协调器。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use optimizer_core::models::{
    JobParameters, JobTrigger, OptimizationJob, OptimizationSchedule, TaskSnapshot,
};
use optimizer_core::traits::{JobRepository, ScheduleRepository};
use optimizer_core::OptimizerResult;
use optimizer_infrastructure::{MetricsCollector, StructuredLogger};
use optimizer_worker::WorkerPool;

use crate::schedule_manager::ScheduleManager;

/// 一次扫描的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub due: usize,
    pub triggered: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Coordinator {
    schedules: Arc<ScheduleManager>,
    schedule_repo: Arc<dyn ScheduleRepository>,
    job_repo: Arc<dyn JobRepository>,
    pool: Arc<WorkerPool>,
    metrics: Arc<MetricsCollector>,
    scan_interval: Duration,
}

impl Coordinator {
    pub fn new(
        schedules: Arc<ScheduleManager>,
        schedule_repo: Arc<dyn ScheduleRepository>,
        job_repo: Arc<dyn JobRepository>,
        pool: Arc<WorkerPool>,
        metrics: Arc<MetricsCollector>,
        scan_interval: Duration,
    ) -> Self {
        Self {
            schedules,
            schedule_repo,
            job_repo,
            pool,
            metrics,
            scan_interval,
        }
    }

    /// 运行扫描循环直到收到停止信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = interval(self.scan_interval);
        info!(
            scan_interval_seconds = self.scan_interval.as_secs(),
            "Schedule coordinator started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.scan_once(Utc::now()).await {
                        StructuredLogger::log_system_error("coordinator", "scan", &e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Schedule coordinator received shutdown signal");
                    break;
                }
            }
        }
    }

    /// 扫描一次到期调度
    pub async fn scan_once(&self, now: DateTime<Utc>) -> OptimizerResult<ScanReport> {
        let started = std::time::Instant::now();
        let due = self.schedule_repo.get_due(now).await?;
        let mut report = ScanReport {
            due: due.len(),
            ..ScanReport::default()
        };

        for mut schedule in due {
            if let Some(active) = self.job_repo.find_active_for_schedule(schedule.id).await? {
                StructuredLogger::log_schedule_skipped(schedule.id, active.id);
                self.metrics.record_job_skipped();
                self.schedules.skip_trigger(&mut schedule, now).await?;
                report.skipped += 1;
                continue;
            }

            match self.launch(&mut schedule, JobTrigger::Scheduled, now).await {
                Ok(_) => report.triggered += 1,
                Err(e) => {
                    error!(schedule_id = schedule.id, error = %e, "Failed to launch scheduled job");
                    report.failed += 1;
                }
            }
        }

        self.metrics
            .record_scan_duration(started.elapsed().as_secs_f64());
        if report.due > 0 {
            info!(
                due = report.due,
                triggered = report.triggered,
                skipped = report.skipped,
                failed = report.failed,
                "Schedule scan finished"
            );
        } else {
            debug!("No schedules due");
        }
        Ok(report)
    }

    /// 任务变更后触发匹配的 on_change 调度
    pub async fn notify_task_changed(
        &self,
        task: &TaskSnapshot,
        now: DateTime<Utc>,
    ) -> OptimizerResult<Vec<OptimizationJob>> {
        let targets = self.schedules.on_change_targets(task, now).await?;
        let mut jobs = Vec::with_capacity(targets.len());

        for mut schedule in targets {
            if let Some(active) = self.job_repo.find_active_for_schedule(schedule.id).await? {
                StructuredLogger::log_schedule_skipped(schedule.id, active.id);
                self.metrics.record_job_skipped();
                continue;
            }
            match self.launch(&mut schedule, JobTrigger::OnChange, now).await {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(
                    schedule_id = schedule.id,
                    task_id = task.id,
                    error = %e,
                    "Failed to launch on_change job"
                ),
            }
        }
        Ok(jobs)
    }

    /// 为调度创建作业、推进调度时间并提交到工作池
    pub async fn launch(
        &self,
        schedule: &mut OptimizationSchedule,
        trigger: JobTrigger,
        now: DateTime<Utc>,
    ) -> OptimizerResult<OptimizationJob> {
        let parameters = job_parameters(schedule, self.schedules.max_changes_ceiling());
        let mut job = self
            .job_repo
            .create(&OptimizationJob::new(
                schedule.owner_id,
                Some(schedule.id),
                trigger,
                parameters,
            ))
            .await?;

        // 作业行已创建，后续任一步失败都要结束它，否则调度会一直被视为运行中
        if let Err(e) = self.schedules.mark_triggered(schedule, now).await {
            self.pool
                .reject(&mut job, "launch_failed", &e.to_string())
                .await;
            return Err(e);
        }
        StructuredLogger::log_schedule_triggered(
            schedule.id,
            schedule.owner_id,
            job.id,
            schedule.next_run_at,
        );

        self.pool.submit(job.clone()).await?;
        Ok(job)
    }
}

/// 由调度定义生成作业参数，按激进程度调整变更上限和置信度阈值
pub fn job_parameters(schedule: &OptimizationSchedule, ceiling: u32) -> JobParameters {
    let (max_changes_per_run, min_confidence_threshold) = schedule.aggressiveness.adjust(
        schedule.max_changes_per_run,
        schedule.min_confidence_threshold,
        ceiling,
    );
    JobParameters {
        scope: schedule.scope,
        filters: schedule.filters.clone(),
        task_ids: None,
        max_changes_per_run,
        min_confidence_threshold,
    }
}
