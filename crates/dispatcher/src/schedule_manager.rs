//! # 调度管理
//!
//! 用户维度的优化调度管理和下次执行时间计算。
//!
//! | 类型 | 下次执行时间 |
//! |------|-------------|
//! | hourly | 上次执行（或创建）时间 + 1小时 |
//! | daily | 设置了执行时刻时取严格晚于参考时间的下一次；否则参考时间 + 24小时 |
//! | on_change | 不自动触发，由任务变更通知驱动 |
//! | manual | 不计算，只能手动运行 |

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use optimizer_core::models::{
    OptimizationAggressiveness, OptimizationSchedule, OptimizationScope, ScheduleState,
    ScheduleType, ScopeFilters, TaskSnapshot,
};
use optimizer_core::traits::{JobRepository, ScheduleRepository};
use optimizer_core::{OptimizerError, OptimizerResult};
use optimizer_worker::CancellationRegistry;

use crate::cron_utils::CronScheduler;

/// 创建/更新调度的输入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDraft {
    pub name: String,
    pub schedule_type: ScheduleType,
    /// `HH:MM` 或 `HH:MM:SS`（UTC）
    #[serde(default)]
    pub time_of_day: Option<String>,
    #[serde(default = "default_scope")]
    pub scope: OptimizationScope,
    #[serde(default)]
    pub filters: ScopeFilters,
    #[serde(default = "default_max_changes")]
    pub max_changes_per_run: u32,
    #[serde(default = "default_min_confidence")]
    pub min_confidence_threshold: f64,
    #[serde(default)]
    pub aggressiveness: OptimizationAggressiveness,
    #[serde(default)]
    pub is_active: Option<bool>,
}

fn default_scope() -> OptimizationScope {
    OptimizationScope::All
}

fn default_max_changes() -> u32 {
    10
}

fn default_min_confidence() -> f64 {
    0.5
}

impl ScheduleDraft {
    pub fn new(name: &str, schedule_type: ScheduleType) -> Self {
        Self {
            name: name.to_string(),
            schedule_type,
            time_of_day: None,
            scope: default_scope(),
            filters: ScopeFilters::default(),
            max_changes_per_run: default_max_changes(),
            min_confidence_threshold: default_min_confidence(),
            aggressiveness: OptimizationAggressiveness::default(),
            is_active: None,
        }
    }
}

pub struct ScheduleManager {
    schedule_repo: Arc<dyn ScheduleRepository>,
    job_repo: Arc<dyn JobRepository>,
    cancellations: CancellationRegistry,
    max_changes_ceiling: u32,
    on_change_cooldown: Duration,
}

impl ScheduleManager {
    pub fn new(
        schedule_repo: Arc<dyn ScheduleRepository>,
        job_repo: Arc<dyn JobRepository>,
        cancellations: CancellationRegistry,
        max_changes_ceiling: u32,
        on_change_cooldown_seconds: i64,
    ) -> Self {
        Self {
            schedule_repo,
            job_repo,
            cancellations,
            max_changes_ceiling,
            on_change_cooldown: Duration::seconds(on_change_cooldown_seconds),
        }
    }

    pub fn max_changes_ceiling(&self) -> u32 {
        self.max_changes_ceiling
    }

    pub async fn create(
        &self,
        owner_id: i64,
        draft: ScheduleDraft,
    ) -> OptimizerResult<OptimizationSchedule> {
        let mut schedule = OptimizationSchedule::new(owner_id, &draft.name, draft.schedule_type);
        self.apply_draft(&mut schedule, draft)?;
        schedule.next_run_at = if schedule.is_active {
            Self::compute_next_run(&schedule, schedule.created_at)?
        } else {
            None
        };

        let created = self.schedule_repo.create(&schedule).await?;
        info!(
            owner_id,
            schedule_id = created.id,
            schedule_type = %created.schedule_type,
            next_run_at = ?created.next_run_at,
            "Created optimization schedule"
        );
        Ok(created)
    }

    pub async fn get(&self, owner_id: i64, id: i64) -> OptimizerResult<OptimizationSchedule> {
        self.schedule_repo
            .get_by_id(owner_id, id)
            .await?
            .ok_or(OptimizerError::ScheduleNotFound { id })
    }

    pub async fn list(&self, owner_id: i64) -> OptimizerResult<Vec<OptimizationSchedule>> {
        self.schedule_repo.list(owner_id).await
    }

    /// 更新调度定义并重新计算下次执行时间
    pub async fn update(
        &self,
        owner_id: i64,
        id: i64,
        draft: ScheduleDraft,
    ) -> OptimizerResult<OptimizationSchedule> {
        let mut schedule = self.get(owner_id, id).await?;
        let was_active = schedule.is_active;
        schedule.name = draft.name.clone();
        schedule.schedule_type = draft.schedule_type;
        self.apply_draft(&mut schedule, draft)?;
        schedule.updated_at = Utc::now();
        schedule.next_run_at = if schedule.is_active {
            let reference = schedule.last_run_at.unwrap_or(schedule.updated_at);
            Self::compute_next_run(&schedule, reference)?
        } else {
            None
        };

        self.schedule_repo.update(&schedule).await?;
        if was_active && !schedule.is_active {
            self.cancel_active_job(id).await?;
        }
        info!(owner_id, schedule_id = id, "Updated optimization schedule");
        Ok(schedule)
    }

    /// 启用或停用调度，停用时取消其运行中的作业
    pub async fn set_active(
        &self,
        owner_id: i64,
        id: i64,
        is_active: bool,
    ) -> OptimizerResult<OptimizationSchedule> {
        let mut schedule = self.get(owner_id, id).await?;
        if schedule.is_active == is_active {
            return Ok(schedule);
        }

        let now = Utc::now();
        schedule.is_active = is_active;
        schedule.updated_at = now;
        schedule.next_run_at = if is_active {
            Self::compute_next_run(&schedule, now)?
        } else {
            None
        };
        self.schedule_repo.update(&schedule).await?;

        if !is_active {
            self.cancel_active_job(id).await?;
        }
        info!(owner_id, schedule_id = id, is_active, "Toggled optimization schedule");
        Ok(schedule)
    }

    pub async fn delete(&self, owner_id: i64, id: i64) -> OptimizerResult<()> {
        self.get(owner_id, id).await?;
        self.cancel_active_job(id).await?;
        self.schedule_repo.delete(owner_id, id).await?;
        info!(owner_id, schedule_id = id, "Deleted optimization schedule");
        Ok(())
    }

    /// 记录一次触发并推进下次执行时间
    pub async fn mark_triggered(
        &self,
        schedule: &mut OptimizationSchedule,
        now: DateTime<Utc>,
    ) -> OptimizerResult<()> {
        schedule.last_run_at = Some(now);
        schedule.next_run_at = Self::compute_next_run(schedule, now)?;
        self.schedule_repo
            .update_run_times(schedule.id, schedule.last_run_at, schedule.next_run_at)
            .await?;
        debug!(
            schedule_id = schedule.id,
            next_run_at = ?schedule.next_run_at,
            "Schedule run times advanced"
        );
        Ok(())
    }

    /// 跳过本次触发：只推进下次执行时间，上次执行时间不变
    pub async fn skip_trigger(
        &self,
        schedule: &mut OptimizationSchedule,
        now: DateTime<Utc>,
    ) -> OptimizerResult<()> {
        schedule.next_run_at = Self::compute_next_run(schedule, now)?;
        self.schedule_repo
            .update_run_times(schedule.id, schedule.last_run_at, schedule.next_run_at)
            .await
    }

    /// 调度的运行时状态
    pub async fn state(
        &self,
        schedule: &OptimizationSchedule,
        now: DateTime<Utc>,
    ) -> OptimizerResult<ScheduleState> {
        if self
            .job_repo
            .find_active_for_schedule(schedule.id)
            .await?
            .is_some()
        {
            return Ok(ScheduleState::Running);
        }
        Ok(if schedule.is_due(now) {
            ScheduleState::Due
        } else {
            ScheduleState::Idle
        })
    }

    /// 任务变更时应触发的 on_change 调度
    ///
    /// 范围和过滤条件需覆盖该任务，且距上次触发超过冷却时间。
    pub async fn on_change_targets(
        &self,
        task: &TaskSnapshot,
        now: DateTime<Utc>,
    ) -> OptimizerResult<Vec<OptimizationSchedule>> {
        let schedules = self.schedule_repo.list_on_change(task.owner_id).await?;
        Ok(schedules
            .into_iter()
            .filter(|s| s.is_active && s.schedule_type == ScheduleType::OnChange)
            .filter(|s| s.scope.matches(task, now) && s.filters.matches_task(task))
            .filter(|s| {
                s.last_run_at
                    .is_none_or(|last| now - last >= self.on_change_cooldown)
            })
            .collect())
    }

    /// 计算下次执行时间
    pub fn compute_next_run(
        schedule: &OptimizationSchedule,
        reference: DateTime<Utc>,
    ) -> OptimizerResult<Option<DateTime<Utc>>> {
        match schedule.schedule_type {
            ScheduleType::Hourly => Ok(Some(reference + Duration::hours(1))),
            ScheduleType::Daily => match schedule.time_of_day {
                Some(time_of_day) => {
                    Ok(CronScheduler::daily_at(time_of_day)?.next_execution_time(reference))
                }
                None => Ok(Some(reference + Duration::hours(24))),
            },
            ScheduleType::OnChange | ScheduleType::Manual => Ok(None),
        }
    }

    async fn cancel_active_job(&self, schedule_id: i64) -> OptimizerResult<()> {
        if let Some(job) = self.job_repo.find_active_for_schedule(schedule_id).await? {
            let cancelled = self.cancellations.cancel(job.id).await;
            info!(schedule_id, job_id = job.id, cancelled, "Cancelling job of deactivated schedule");
        }
        Ok(())
    }

    fn apply_draft(
        &self,
        schedule: &mut OptimizationSchedule,
        draft: ScheduleDraft,
    ) -> OptimizerResult<()> {
        if draft.name.trim().is_empty() {
            return Err(OptimizerError::Validation("调度名称不能为空".to_string()));
        }
        if draft.max_changes_per_run == 0 || draft.max_changes_per_run > self.max_changes_ceiling {
            return Err(OptimizerError::Validation(format!(
                "max_changes_per_run 必须在 1 到 {} 之间",
                self.max_changes_ceiling
            )));
        }
        if !(0.0..=1.0).contains(&draft.min_confidence_threshold) {
            return Err(OptimizerError::Validation(
                "min_confidence_threshold 必须在 [0,1] 区间内".to_string(),
            ));
        }

        schedule.time_of_day = match draft.time_of_day.as_deref() {
            Some(raw) => Some(parse_time_of_day(raw)?),
            None => None,
        };
        schedule.scope = draft.scope;
        schedule.filters = draft.filters;
        schedule.max_changes_per_run = draft.max_changes_per_run;
        schedule.min_confidence_threshold = draft.min_confidence_threshold;
        schedule.aggressiveness = draft.aggressiveness;
        if let Some(is_active) = draft.is_active {
            schedule.is_active = is_active;
        }
        Ok(())
    }
}

/// 解析 `HH:MM` 或 `HH:MM:SS`
pub fn parse_time_of_day(raw: &str) -> OptimizerResult<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| OptimizerError::Validation(format!("无效的执行时刻: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use optimizer_testing_utils::{MockJobRepository, MockScheduleRepository, ScheduleBuilder};

    fn manager() -> (ScheduleManager, MockScheduleRepository) {
        let repo = MockScheduleRepository::new();
        let manager = ScheduleManager::new(
            Arc::new(repo.clone()),
            Arc::new(MockJobRepository::new()),
            CancellationRegistry::new(),
            50,
            300,
        );
        (manager, repo)
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(
            parse_time_of_day("09:30").unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap()
        );
        assert_eq!(
            parse_time_of_day("23:59:30").unwrap(),
            NaiveTime::from_hms_opt(23, 59, 30).unwrap()
        );
        assert!(parse_time_of_day("25:00").is_err());
    }

    #[test]
    fn test_compute_next_run() {
        let reference = Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 0).unwrap();

        let hourly = ScheduleBuilder::hourly().build();
        assert_eq!(
            ScheduleManager::compute_next_run(&hourly, reference).unwrap(),
            Some(reference + Duration::hours(1))
        );

        let daily = ScheduleBuilder::daily_at(9, 0).build();
        assert_eq!(
            ScheduleManager::compute_next_run(&daily, reference).unwrap(),
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap())
        );

        let mut untimed = ScheduleBuilder::daily_at(9, 0).build();
        untimed.time_of_day = None;
        assert_eq!(
            ScheduleManager::compute_next_run(&untimed, reference).unwrap(),
            Some(reference + Duration::hours(24))
        );

        let manual = ScheduleBuilder::new(ScheduleType::Manual).build();
        assert_eq!(ScheduleManager::compute_next_run(&manual, reference).unwrap(), None);
        let on_change = ScheduleBuilder::on_change().build();
        assert_eq!(ScheduleManager::compute_next_run(&on_change, reference).unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_validates_limits() {
        let (manager, _) = manager();

        let mut draft = ScheduleDraft::new("too many", ScheduleType::Hourly);
        draft.max_changes_per_run = 51;
        assert!(matches!(
            manager.create(1, draft).await,
            Err(OptimizerError::Validation(_))
        ));

        let mut draft = ScheduleDraft::new("zero", ScheduleType::Hourly);
        draft.max_changes_per_run = 0;
        assert!(manager.create(1, draft).await.is_err());

        let mut draft = ScheduleDraft::new("confidence", ScheduleType::Hourly);
        draft.min_confidence_threshold = 1.5;
        assert!(manager.create(1, draft).await.is_err());

        let mut draft = ScheduleDraft::new("bad time", ScheduleType::Daily);
        draft.time_of_day = Some("noon".to_string());
        assert!(manager.create(1, draft).await.is_err());
    }

    #[tokio::test]
    async fn test_create_sets_next_run() {
        let (manager, _) = manager();

        let hourly = manager
            .create(1, ScheduleDraft::new("hourly", ScheduleType::Hourly))
            .await
            .unwrap();
        assert_eq!(
            hourly.next_run_at,
            Some(hourly.created_at + Duration::hours(1))
        );

        let manual = manager
            .create(1, ScheduleDraft::new("manual", ScheduleType::Manual))
            .await
            .unwrap();
        assert!(manual.next_run_at.is_none());
    }

    #[tokio::test]
    async fn test_mark_triggered_advances_run_times() {
        let (manager, repo) = manager();
        let mut schedule = manager
            .create(1, ScheduleDraft::new("hourly", ScheduleType::Hourly))
            .await
            .unwrap();
        let now = Utc::now();

        manager.mark_triggered(&mut schedule, now).await.unwrap();

        let stored = repo.get(schedule.id).unwrap();
        assert_eq!(stored.last_run_at, Some(now));
        assert_eq!(stored.next_run_at, Some(now + Duration::hours(1)));
    }

    #[tokio::test]
    async fn test_deactivate_clears_next_run() {
        let (manager, _) = manager();
        let schedule = manager
            .create(1, ScheduleDraft::new("hourly", ScheduleType::Hourly))
            .await
            .unwrap();

        let inactive = manager.set_active(1, schedule.id, false).await.unwrap();
        assert!(!inactive.is_active);
        assert!(inactive.next_run_at.is_none());

        let active = manager.set_active(1, schedule.id, true).await.unwrap();
        assert!(active.next_run_at.is_some());
    }

    #[tokio::test]
    async fn test_owner_isolation() {
        let (manager, _) = manager();
        let schedule = manager
            .create(1, ScheduleDraft::new("mine", ScheduleType::Manual))
            .await
            .unwrap();

        assert!(matches!(
            manager.get(2, schedule.id).await,
            Err(OptimizerError::ScheduleNotFound { .. })
        ));
        assert!(manager.delete(2, schedule.id).await.is_err());
    }
}
