//! 数据仓储层接口定义
//!
//! 引擎自有实体（规则、评分、历史、调度、作业）的持久化抽象：
//! - `RuleRepository` - 优化规则的CRUD和反馈统计
//! - `ScoreRepository` - 评分记录，维护 `is_current` 唯一性
//! - `HistoryRepository` - 只追加的优化历史，反馈字段只写一次
//! - `ScheduleRepository` - 优化调度及其运行时间
//! - `JobRepository` - 优化作业的生命周期
//!
//! 所有方法都是异步的，返回 `OptimizerResult<T>`，实现需要 `Send + Sync`。
//! 除特别说明外，按ID读取的方法在记录不存在时返回 `Ok(None)`。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::OptimizerResult;
use crate::models::{
    JobStatus, OptimizationHistory, OptimizationJob, OptimizationRule, OptimizationSchedule,
    TaskPriorityScore,
};

/// 优化规则仓储
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// 创建规则，返回带数据库ID的规则
    async fn create(&self, rule: &OptimizationRule) -> OptimizerResult<OptimizationRule>;

    async fn get_by_id(&self, owner_id: i64, id: i64) -> OptimizerResult<Option<OptimizationRule>>;

    async fn list(&self, owner_id: i64) -> OptimizerResult<Vec<OptimizationRule>>;

    async fn list_active(&self, owner_id: i64) -> OptimizerResult<Vec<OptimizationRule>>;

    /// 更新规则定义（名称、配置、权重、条件、启用状态）
    async fn update(&self, rule: &OptimizationRule) -> OptimizerResult<()>;

    /// 物理删除规则
    async fn delete(&self, owner_id: i64, id: i64) -> OptimizerResult<()>;

    /// 原子地记录一次反馈结果
    ///
    /// 规则已不存在时返回 `Ok(false)`。
    async fn record_outcome(&self, rule_id: i64, success: bool) -> OptimizerResult<bool>;
}

/// 任务评分仓储
#[async_trait]
pub trait ScoreRepository: Send + Sync {
    /// 保存一条新的当前评分
    ///
    /// 同一 (task, owner) 之前的当前评分必须在同一事务中清除，
    /// 保证任意时刻最多只有一条 `is_current = true`。
    async fn save_current(&self, score: &TaskPriorityScore) -> OptimizerResult<TaskPriorityScore>;

    async fn get_current(
        &self,
        owner_id: i64,
        task_id: i64,
    ) -> OptimizerResult<Option<TaskPriorityScore>>;

    /// 任务的全部评分记录，按计算时间倒序
    async fn list_for_task(
        &self,
        owner_id: i64,
        task_id: i64,
    ) -> OptimizerResult<Vec<TaskPriorityScore>>;
}

/// 优化历史仓储
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn create(&self, history: &OptimizationHistory) -> OptimizerResult<OptimizationHistory>;

    async fn get_by_id(
        &self,
        owner_id: i64,
        id: i64,
    ) -> OptimizerResult<Option<OptimizationHistory>>;

    /// 按创建时间倒序列出，`limit` 为空时返回全部
    async fn list(
        &self,
        owner_id: i64,
        limit: Option<u32>,
    ) -> OptimizerResult<Vec<OptimizationHistory>>;

    async fn list_by_job(&self, job_id: i64) -> OptimizerResult<Vec<OptimizationHistory>>;

    /// 写入用户反馈，仅当尚未记录反馈时生效
    ///
    /// 返回是否实际写入。
    async fn record_feedback(
        &self,
        id: i64,
        accepted: bool,
        feedback: Option<&str>,
        at: DateTime<Utc>,
    ) -> OptimizerResult<bool>;

    /// 标记回滚，仅当尚未回滚时生效
    ///
    /// 返回是否实际写入。
    async fn mark_reverted(&self, id: i64, at: DateTime<Utc>) -> OptimizerResult<bool>;

    /// 规则是否被任意历史记录的快照引用
    async fn is_rule_referenced(&self, rule_id: i64) -> OptimizerResult<bool>;
}

/// 优化调度仓储
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn create(&self, schedule: &OptimizationSchedule)
        -> OptimizerResult<OptimizationSchedule>;

    async fn get_by_id(
        &self,
        owner_id: i64,
        id: i64,
    ) -> OptimizerResult<Option<OptimizationSchedule>>;

    async fn list(&self, owner_id: i64) -> OptimizerResult<Vec<OptimizationSchedule>>;

    async fn update(&self, schedule: &OptimizationSchedule) -> OptimizerResult<()>;

    async fn delete(&self, owner_id: i64, id: i64) -> OptimizerResult<()>;

    /// 所有用户中到期的 daily/hourly 活跃调度
    async fn get_due(&self, now: DateTime<Utc>) -> OptimizerResult<Vec<OptimizationSchedule>>;

    /// 用户的活跃 on_change 调度
    async fn list_on_change(&self, owner_id: i64) -> OptimizerResult<Vec<OptimizationSchedule>>;

    async fn update_run_times(
        &self,
        id: i64,
        last_run_at: Option<DateTime<Utc>>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> OptimizerResult<()>;
}

/// 优化作业仓储
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &OptimizationJob) -> OptimizerResult<OptimizationJob>;

    async fn get_by_id(&self, id: i64) -> OptimizerResult<Option<OptimizationJob>>;

    /// 覆盖写入作业的状态、计数、进度和错误详情
    async fn update(&self, job: &OptimizationJob) -> OptimizerResult<()>;

    /// 调度当前处于 pending/running 的作业
    async fn find_active_for_schedule(
        &self,
        schedule_id: i64,
    ) -> OptimizerResult<Option<OptimizationJob>>;

    async fn list(&self, owner_id: i64, limit: Option<u32>)
        -> OptimizerResult<Vec<OptimizationJob>>;

    /// 统计用户的作业数量，`status` 为空时统计全部
    async fn count(&self, owner_id: i64, status: Option<JobStatus>) -> OptimizerResult<u64>;
}
