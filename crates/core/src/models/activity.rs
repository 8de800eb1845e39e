use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Priority;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    PriorityChanged,
    PriorityReverted,
}

/// 发送给活动日志协作方的事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityEvent {
    pub kind: ActivityKind,
    pub owner_id: i64,
    pub task_id: i64,
    pub history_id: i64,
    pub old_priority: Priority,
    pub new_priority: Priority,
    pub occurred_at: DateTime<Utc>,
}
