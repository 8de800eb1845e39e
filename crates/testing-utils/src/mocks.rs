//! Mock implementations for all repository and collaborator traits
//!
//! In-memory implementations used by unit and integration tests without a
//! database. The task store supports failure injection so tests can exercise
//! the job processor's retry and partial-failure paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optimizer_core::models::{
    ActivityEvent, JobStatus, OptimizationHistory, OptimizationJob, OptimizationRule,
    OptimizationSchedule, Priority, ScheduleType, TaskPriorityScore, TaskQuery, TaskSignals,
    TaskSnapshot,
};
use optimizer_core::traits::{
    ActivityLog, HistoryRepository, JobRepository, RuleRepository, ScheduleRepository,
    ScoreRepository, SignalAggregator, TaskStore,
};
use optimizer_core::{OptimizerError, OptimizerResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock implementation of RuleRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockRuleRepository {
    rules: Arc<Mutex<HashMap<i64, OptimizationRule>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.rules.lock().unwrap().len()
    }

    pub fn get(&self, id: i64) -> Option<OptimizationRule> {
        self.rules.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl RuleRepository for MockRuleRepository {
    async fn create(&self, rule: &OptimizationRule) -> OptimizerResult<OptimizationRule> {
        let mut rules = self.rules.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;

        let mut new_rule = rule.clone();
        new_rule.id = *next_id;
        rules.insert(new_rule.id, new_rule.clone());
        Ok(new_rule)
    }

    async fn get_by_id(&self, owner_id: i64, id: i64) -> OptimizerResult<Option<OptimizationRule>> {
        let rules = self.rules.lock().unwrap();
        Ok(rules.get(&id).filter(|r| r.owner_id == owner_id).cloned())
    }

    async fn list(&self, owner_id: i64) -> OptimizerResult<Vec<OptimizationRule>> {
        let rules = self.rules.lock().unwrap();
        let mut result: Vec<_> = rules
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        result.sort_by_key(|r| r.id);
        Ok(result)
    }

    async fn list_active(&self, owner_id: i64) -> OptimizerResult<Vec<OptimizationRule>> {
        let mut result = self.list(owner_id).await?;
        result.retain(|r| r.is_active);
        Ok(result)
    }

    async fn update(&self, rule: &OptimizationRule) -> OptimizerResult<()> {
        let mut rules = self.rules.lock().unwrap();
        if !rules.contains_key(&rule.id) {
            return Err(OptimizerError::RuleNotFound { id: rule.id });
        }
        rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn delete(&self, owner_id: i64, id: i64) -> OptimizerResult<()> {
        let mut rules = self.rules.lock().unwrap();
        if rules.get(&id).is_some_and(|r| r.owner_id == owner_id) {
            rules.remove(&id);
        }
        Ok(())
    }

    async fn record_outcome(&self, rule_id: i64, success: bool) -> OptimizerResult<bool> {
        let mut rules = self.rules.lock().unwrap();
        match rules.get_mut(&rule_id) {
            Some(rule) => {
                rule.record_outcome(success);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Mock implementation of ScoreRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockScoreRepository {
    scores: Arc<Mutex<Vec<TaskPriorityScore>>>,
}

impl MockScoreRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<TaskPriorityScore> {
        self.scores.lock().unwrap().clone()
    }

    pub fn current_count(&self, owner_id: i64, task_id: i64) -> usize {
        self.scores
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.owner_id == owner_id && s.task_id == task_id && s.is_current)
            .count()
    }
}

#[async_trait]
impl ScoreRepository for MockScoreRepository {
    async fn save_current(&self, score: &TaskPriorityScore) -> OptimizerResult<TaskPriorityScore> {
        let mut scores = self.scores.lock().unwrap();
        for existing in scores
            .iter_mut()
            .filter(|s| s.task_id == score.task_id && s.owner_id == score.owner_id)
        {
            existing.is_current = false;
        }

        let mut new_score = score.clone();
        new_score.id = scores.len() as i64 + 1;
        new_score.is_current = true;
        scores.push(new_score.clone());
        Ok(new_score)
    }

    async fn get_current(
        &self,
        owner_id: i64,
        task_id: i64,
    ) -> OptimizerResult<Option<TaskPriorityScore>> {
        let scores = self.scores.lock().unwrap();
        Ok(scores
            .iter()
            .find(|s| s.owner_id == owner_id && s.task_id == task_id && s.is_current)
            .cloned())
    }

    async fn list_for_task(
        &self,
        owner_id: i64,
        task_id: i64,
    ) -> OptimizerResult<Vec<TaskPriorityScore>> {
        let scores = self.scores.lock().unwrap();
        let mut result: Vec<_> = scores
            .iter()
            .filter(|s| s.owner_id == owner_id && s.task_id == task_id)
            .cloned()
            .collect();
        result.reverse();
        Ok(result)
    }
}

/// Mock implementation of HistoryRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockHistoryRepository {
    histories: Arc<Mutex<Vec<OptimizationHistory>>>,
    fail_create: Arc<AtomicBool>,
}

impl MockHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让历史记录写入失败
    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<OptimizationHistory> {
        self.histories.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryRepository for MockHistoryRepository {
    async fn create(&self, history: &OptimizationHistory) -> OptimizerResult<OptimizationHistory> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(OptimizerError::Persistence("历史记录写入失败".to_string()));
        }
        let mut histories = self.histories.lock().unwrap();
        let mut new_history = history.clone();
        new_history.id = histories.len() as i64 + 1;
        histories.push(new_history.clone());
        Ok(new_history)
    }

    async fn get_by_id(
        &self,
        owner_id: i64,
        id: i64,
    ) -> OptimizerResult<Option<OptimizationHistory>> {
        let histories = self.histories.lock().unwrap();
        Ok(histories
            .iter()
            .find(|h| h.id == id && h.owner_id == owner_id)
            .cloned())
    }

    async fn list(
        &self,
        owner_id: i64,
        limit: Option<u32>,
    ) -> OptimizerResult<Vec<OptimizationHistory>> {
        let histories = self.histories.lock().unwrap();
        let mut result: Vec<_> = histories
            .iter()
            .filter(|h| h.owner_id == owner_id)
            .cloned()
            .collect();
        result.reverse();
        if let Some(limit) = limit {
            result.truncate(limit as usize);
        }
        Ok(result)
    }

    async fn list_by_job(&self, job_id: i64) -> OptimizerResult<Vec<OptimizationHistory>> {
        let histories = self.histories.lock().unwrap();
        Ok(histories
            .iter()
            .filter(|h| h.job_id == Some(job_id))
            .cloned()
            .collect())
    }

    async fn record_feedback(
        &self,
        id: i64,
        accepted: bool,
        feedback: Option<&str>,
        at: DateTime<Utc>,
    ) -> OptimizerResult<bool> {
        let mut histories = self.histories.lock().unwrap();
        match histories.iter_mut().find(|h| h.id == id) {
            Some(history) if history.user_accepted.is_none() => {
                history.user_accepted = Some(accepted);
                history.user_feedback = feedback.map(str::to_string);
                history.feedback_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_reverted(&self, id: i64, at: DateTime<Utc>) -> OptimizerResult<bool> {
        let mut histories = self.histories.lock().unwrap();
        match histories.iter_mut().find(|h| h.id == id) {
            Some(history) if history.reverted_at.is_none() => {
                history.reverted_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn is_rule_referenced(&self, rule_id: i64) -> OptimizerResult<bool> {
        let histories = self.histories.lock().unwrap();
        Ok(histories
            .iter()
            .any(|h| h.applied_rules.iter().any(|r| r.rule_id == rule_id)))
    }
}

/// Mock implementation of ScheduleRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockScheduleRepository {
    schedules: Arc<Mutex<HashMap<i64, OptimizationSchedule>>>,
    next_id: Arc<Mutex<i64>>,
    run_time_failures: Arc<AtomicU32>,
}

impl MockScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让接下来 `times` 次执行时间更新失败
    pub fn fail_update_run_times(&self, times: u32) {
        self.run_time_failures.store(times, Ordering::SeqCst);
    }

    pub fn get(&self, id: i64) -> Option<OptimizationSchedule> {
        self.schedules.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl ScheduleRepository for MockScheduleRepository {
    async fn create(&self, schedule: &OptimizationSchedule) -> OptimizerResult<OptimizationSchedule> {
        let mut schedules = self.schedules.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;

        let mut new_schedule = schedule.clone();
        new_schedule.id = *next_id;
        schedules.insert(new_schedule.id, new_schedule.clone());
        Ok(new_schedule)
    }

    async fn get_by_id(
        &self,
        owner_id: i64,
        id: i64,
    ) -> OptimizerResult<Option<OptimizationSchedule>> {
        let schedules = self.schedules.lock().unwrap();
        Ok(schedules.get(&id).filter(|s| s.owner_id == owner_id).cloned())
    }

    async fn list(&self, owner_id: i64) -> OptimizerResult<Vec<OptimizationSchedule>> {
        let schedules = self.schedules.lock().unwrap();
        let mut result: Vec<_> = schedules
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect();
        result.sort_by_key(|s| s.id);
        Ok(result)
    }

    async fn update(&self, schedule: &OptimizationSchedule) -> OptimizerResult<()> {
        let mut schedules = self.schedules.lock().unwrap();
        if !schedules.contains_key(&schedule.id) {
            return Err(OptimizerError::ScheduleNotFound { id: schedule.id });
        }
        schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn delete(&self, owner_id: i64, id: i64) -> OptimizerResult<()> {
        let mut schedules = self.schedules.lock().unwrap();
        if schedules.get(&id).is_some_and(|s| s.owner_id == owner_id) {
            schedules.remove(&id);
        }
        Ok(())
    }

    async fn get_due(&self, now: DateTime<Utc>) -> OptimizerResult<Vec<OptimizationSchedule>> {
        let schedules = self.schedules.lock().unwrap();
        let mut result: Vec<_> = schedules
            .values()
            .filter(|s| s.is_due(now))
            .cloned()
            .collect();
        result.sort_by_key(|s| s.id);
        Ok(result)
    }

    async fn list_on_change(&self, owner_id: i64) -> OptimizerResult<Vec<OptimizationSchedule>> {
        let mut result = self.list(owner_id).await?;
        result.retain(|s| s.is_active && s.schedule_type == ScheduleType::OnChange);
        Ok(result)
    }

    async fn update_run_times(
        &self,
        id: i64,
        last_run_at: Option<DateTime<Utc>>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> OptimizerResult<()> {
        if self
            .run_time_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(OptimizerError::Persistence("调度时间更新失败".to_string()));
        }
        let mut schedules = self.schedules.lock().unwrap();
        let schedule = schedules
            .get_mut(&id)
            .ok_or(OptimizerError::ScheduleNotFound { id })?;
        schedule.last_run_at = last_run_at;
        schedule.next_run_at = next_run_at;
        Ok(())
    }
}

/// Mock implementation of JobRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockJobRepository {
    jobs: Arc<Mutex<HashMap<i64, OptimizationJob>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: i64) -> Option<OptimizationJob> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<OptimizationJob> {
        let mut jobs: Vec<_> = self.jobs.lock().unwrap().values().cloned().collect();
        jobs.sort_by_key(|j| j.id);
        jobs
    }
}

#[async_trait]
impl JobRepository for MockJobRepository {
    async fn create(&self, job: &OptimizationJob) -> OptimizerResult<OptimizationJob> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;

        let mut new_job = job.clone();
        new_job.id = *next_id;
        jobs.insert(new_job.id, new_job.clone());
        Ok(new_job)
    }

    async fn get_by_id(&self, id: i64) -> OptimizerResult<Option<OptimizationJob>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, job: &OptimizationJob) -> OptimizerResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if !jobs.contains_key(&job.id) {
            return Err(OptimizerError::JobNotFound { id: job.id });
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find_active_for_schedule(
        &self,
        schedule_id: i64,
    ) -> OptimizerResult<Option<OptimizationJob>> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .values()
            .filter(|j| j.schedule_id == Some(schedule_id) && j.is_active())
            .min_by_key(|j| j.id)
            .cloned())
    }

    async fn list(&self, owner_id: i64, limit: Option<u32>) -> OptimizerResult<Vec<OptimizationJob>> {
        let jobs = self.jobs.lock().unwrap();
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| j.owner_id == owner_id)
            .cloned()
            .collect();
        result.sort_by_key(|j| std::cmp::Reverse(j.id));
        if let Some(limit) = limit {
            result.truncate(limit as usize);
        }
        Ok(result)
    }

    async fn count(&self, owner_id: i64, status: Option<JobStatus>) -> OptimizerResult<u64> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .values()
            .filter(|j| j.owner_id == owner_id && status.is_none_or(|s| j.status == s))
            .count() as u64)
    }
}

/// In-memory task store with failure injection
#[derive(Debug, Clone, Default)]
pub struct MockTaskStore {
    tasks: Arc<Mutex<HashMap<i64, TaskSnapshot>>>,
    /// task id -> 剩余失败次数
    set_priority_failures: Arc<Mutex<HashMap<i64, u32>>>,
    fail_get_tasks: Arc<AtomicBool>,
    ignore_paging: Arc<AtomicBool>,
    set_priority_calls: Arc<Mutex<Vec<(i64, Priority)>>>,
}

impl MockTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<TaskSnapshot>) -> Self {
        let store = Self::new();
        for task in tasks {
            store.insert(task);
        }
        store
    }

    pub fn insert(&self, task: TaskSnapshot) {
        self.tasks.lock().unwrap().insert(task.id, task);
    }

    pub fn task(&self, id: i64) -> Option<TaskSnapshot> {
        self.tasks.lock().unwrap().get(&id).cloned()
    }

    pub fn priority_of(&self, id: i64) -> Option<Priority> {
        self.task(id).map(|t| t.priority)
    }

    /// 让指定任务的前 `times` 次优先级写入失败
    pub fn fail_set_priority(&self, task_id: i64, times: u32) {
        self.set_priority_failures
            .lock()
            .unwrap()
            .insert(task_id, times);
    }

    /// 让候选任务查询失败
    pub fn fail_get_tasks(&self, fail: bool) {
        self.fail_get_tasks.store(fail, Ordering::SeqCst);
    }

    /// 查询时忽略 offset/limit，总是返回全部匹配任务
    pub fn ignore_paging(&self, ignore: bool) {
        self.ignore_paging.store(ignore, Ordering::SeqCst);
    }

    pub fn set_priority_calls(&self) -> Vec<(i64, Priority)> {
        self.set_priority_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskStore for MockTaskStore {
    async fn get_tasks(&self, query: &TaskQuery) -> OptimizerResult<Vec<TaskSnapshot>> {
        if self.fail_get_tasks.load(Ordering::SeqCst) {
            return Err(OptimizerError::Persistence("任务存储不可用".to_string()));
        }

        let now = Utc::now();
        let tasks = self.tasks.lock().unwrap();
        let mut matched: Vec<_> = tasks
            .values()
            .filter(|t| query.matches(t, now))
            .cloned()
            .collect();
        matched.sort_by_key(|t| t.id);

        if self.ignore_paging.load(Ordering::SeqCst) {
            return Ok(matched);
        }
        Ok(matched
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn get_task(&self, owner_id: i64, task_id: i64) -> OptimizerResult<Option<TaskSnapshot>> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks
            .get(&task_id)
            .filter(|t| t.owner_id == owner_id)
            .cloned())
    }

    async fn set_priority(
        &self,
        owner_id: i64,
        task_id: i64,
        priority: Priority,
    ) -> OptimizerResult<()> {
        {
            let mut failures = self.set_priority_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&task_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(OptimizerError::Persistence(format!(
                        "任务 {task_id} 拒绝修改优先级"
                    )));
                }
            }
        }

        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&task_id)
            .filter(|t| t.owner_id == owner_id)
            .ok_or(OptimizerError::TaskNotFound { id: task_id })?;
        task.priority = priority;
        task.updated_at = Utc::now();
        self.set_priority_calls
            .lock()
            .unwrap()
            .push((task_id, priority));
        Ok(())
    }
}

/// Signal aggregator returning fixed signals per task
#[derive(Debug, Clone, Default)]
pub struct MockSignalAggregator {
    signals: Arc<Mutex<HashMap<i64, TaskSignals>>>,
    delay: Option<Duration>,
}

impl MockSignalAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次查询前等待，用于超时和取消测试
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set(&self, task_id: i64, signals: TaskSignals) {
        self.signals.lock().unwrap().insert(task_id, signals);
    }
}

#[async_trait]
impl SignalAggregator for MockSignalAggregator {
    async fn signals_for(&self, _owner_id: i64, task_id: i64) -> OptimizerResult<TaskSignals> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .signals
            .lock()
            .unwrap()
            .get(&task_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Activity log that keeps every event in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingActivityLog {
    events: Arc<Mutex<Vec<ActivityEvent>>>,
}

impl RecordingActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ActivityEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ActivityLog for RecordingActivityLog {
    fn record(&self, event: ActivityEvent) {
        self.events.lock().unwrap().push(event);
    }
}
