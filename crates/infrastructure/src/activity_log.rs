//! 基于tracing的活动日志适配器

use tracing::info;

use optimizer_core::models::{ActivityEvent, ActivityKind};
use optimizer_core::traits::ActivityLog;

/// 把活动事件写入日志，不做持久化
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActivityLog;

impl ActivityLog for TracingActivityLog {
    fn record(&self, event: ActivityEvent) {
        let kind = match event.kind {
            ActivityKind::PriorityChanged => "priority_changed",
            ActivityKind::PriorityReverted => "priority_reverted",
        };
        info!(
            event = "activity",
            activity.kind = kind,
            owner_id = event.owner_id,
            task.id = event.task_id,
            history.id = event.history_id,
            task.old_priority = event.old_priority.as_str(),
            task.new_priority = event.new_priority.as_str(),
            occurred_at = %event.occurred_at,
            "Task activity recorded"
        );
    }
}
