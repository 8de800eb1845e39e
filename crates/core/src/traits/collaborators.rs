//! 外部协作方接口
//!
//! 任务的增删改、信号聚合、活动日志都不属于引擎本身，
//! 引擎只通过这里的接口读取任务、写回优先级和上报事件。

use async_trait::async_trait;

use crate::errors::OptimizerResult;
use crate::models::{ActivityEvent, Priority, TaskQuery, TaskSignals, TaskSnapshot};

/// 任务快照提供方
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 按查询条件分页返回任务
    async fn get_tasks(&self, query: &TaskQuery) -> OptimizerResult<Vec<TaskSnapshot>>;

    async fn get_task(&self, owner_id: i64, task_id: i64) -> OptimizerResult<Option<TaskSnapshot>>;

    /// 修改任务优先级，任务不存在时返回 `TaskNotFound`
    async fn set_priority(
        &self,
        owner_id: i64,
        task_id: i64,
        priority: Priority,
    ) -> OptimizerResult<()>;
}

/// 预聚合信号提供方
#[async_trait]
pub trait SignalAggregator: Send + Sync {
    /// 没有信号时返回空集合
    async fn signals_for(&self, owner_id: i64, task_id: i64) -> OptimizerResult<TaskSignals>;
}

/// 活动日志（可选，发送即忘）
pub trait ActivityLog: Send + Sync {
    fn record(&self, event: ActivityEvent);
}

/// 不记录任何事件的活动日志
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopActivityLog;

impl ActivityLog for NoopActivityLog {
    fn record(&self, _event: ActivityEvent) {}
}
