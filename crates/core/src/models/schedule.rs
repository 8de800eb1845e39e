use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OptimizationScope, ScopeFilters};
use crate::errors::OptimizerError;

/// 调度类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Daily,
    Hourly,
    OnChange,
    Manual,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::Daily => "daily",
            ScheduleType::Hourly => "hourly",
            ScheduleType::OnChange => "on_change",
            ScheduleType::Manual => "manual",
        }
    }

    /// 是否由协调器按时间自动触发
    pub fn is_recurring(&self) -> bool {
        matches!(self, ScheduleType::Daily | ScheduleType::Hourly)
    }
}

impl fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleType {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(ScheduleType::Daily),
            "hourly" => Ok(ScheduleType::Hourly),
            "on_change" => Ok(ScheduleType::OnChange),
            "manual" => Ok(ScheduleType::Manual),
            _ => Err(OptimizerError::Validation(format!("无效的调度类型: {s}"))),
        }
    }
}

crate::impl_sqlite_text_enum!(ScheduleType);

/// 调度的运行时状态（由调度时间和租约推导）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleState {
    Idle,
    Due,
    Running,
}

/// 优化激进程度
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationAggressiveness {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl OptimizationAggressiveness {
    /// 置信度阈值调整幅度
    pub const CONFIDENCE_STEP: f64 = 0.1;

    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationAggressiveness::Conservative => "conservative",
            OptimizationAggressiveness::Balanced => "balanced",
            OptimizationAggressiveness::Aggressive => "aggressive",
        }
    }

    /// 调整单次最大变更数和最低置信度
    ///
    /// 返回值中的变更数不超过 `ceiling`，置信度截断到 [0,1]。
    pub fn adjust(&self, max_changes: u32, min_confidence: f64, ceiling: u32) -> (u32, f64) {
        match self {
            OptimizationAggressiveness::Balanced => (max_changes.min(ceiling), min_confidence),
            OptimizationAggressiveness::Aggressive => (
                max_changes.saturating_mul(2).min(ceiling).max(1),
                (min_confidence - Self::CONFIDENCE_STEP).clamp(0.0, 1.0),
            ),
            OptimizationAggressiveness::Conservative => (
                (max_changes / 2).max(1).min(ceiling),
                (min_confidence + Self::CONFIDENCE_STEP).clamp(0.0, 1.0),
            ),
        }
    }
}

impl FromStr for OptimizationAggressiveness {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conservative" => Ok(OptimizationAggressiveness::Conservative),
            "balanced" => Ok(OptimizationAggressiveness::Balanced),
            "aggressive" => Ok(OptimizationAggressiveness::Aggressive),
            _ => Err(OptimizerError::Validation(format!("无效的激进程度: {s}"))),
        }
    }
}

crate::impl_sqlite_text_enum!(OptimizationAggressiveness);

/// 优化调度定义
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizationSchedule {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub schedule_type: ScheduleType,
    /// daily 调度的执行时刻（UTC）
    pub time_of_day: Option<NaiveTime>,
    pub scope: OptimizationScope,
    #[serde(default)]
    pub filters: ScopeFilters,
    pub max_changes_per_run: u32,
    pub min_confidence_threshold: f64,
    #[serde(default)]
    pub aggressiveness: OptimizationAggressiveness,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OptimizationSchedule {
    pub fn new(owner_id: i64, name: &str, schedule_type: ScheduleType) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由数据库生成
            owner_id,
            name: name.to_string(),
            schedule_type,
            time_of_day: None,
            scope: OptimizationScope::All,
            filters: ScopeFilters::default(),
            max_changes_per_run: 10,
            min_confidence_threshold: 0.5,
            aggressiveness: OptimizationAggressiveness::Balanced,
            is_active: true,
            last_run_at: None,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 是否到达执行时间
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.schedule_type.is_recurring()
            && self.next_run_at.is_some_and(|next| next <= now)
    }
}
