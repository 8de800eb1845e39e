//! Test data builders for creating test entities
//!
//! Builder patterns for creating test data with sensible defaults and easy
//! customization.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use optimizer_core::models::{
    BlockedTaskRef, Condition, DeadlineConfig, DependencyConfig, OptimizationAggressiveness,
    OptimizationRule, OptimizationSchedule, OptimizationScope, Priority, RuleConfig, ScheduleType,
    ScopeFilters, SignalMap, SignalRuleConfig, TaskSignals, TaskSnapshot, TaskStatus,
};

/// Builder for creating test TaskSnapshot entities
pub struct TaskSnapshotBuilder {
    task: TaskSnapshot,
}

impl TaskSnapshotBuilder {
    pub fn new() -> Self {
        Self {
            task: TaskSnapshot {
                id: 1,
                owner_id: 1,
                title: "test_task".to_string(),
                priority: Priority::Medium,
                status: TaskStatus::Pending,
                due_date: None,
                category: None,
                project_id: None,
                blocked_tasks: vec![],
                updated_at: Utc::now(),
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.task.id = id;
        self.task.title = format!("task_{id}");
        self
    }

    pub fn with_owner(mut self, owner_id: i64) -> Self {
        self.task.owner_id = owner_id;
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.task.title = title.to_string();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.task.due_date = Some(due_date);
        self
    }

    /// 相对当前时间的截止时间，负数表示已逾期
    pub fn due_in_hours(mut self, hours: i64) -> Self {
        self.task.due_date = Some(Utc::now() + Duration::hours(hours));
        self
    }

    pub fn due_in_minutes(mut self, minutes: i64) -> Self {
        self.task.due_date = Some(Utc::now() + Duration::minutes(minutes));
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.task.category = Some(category.to_string());
        self
    }

    pub fn with_project(mut self, project_id: i64) -> Self {
        self.task.project_id = Some(project_id);
        self
    }

    pub fn blocking(mut self, task_ids: &[i64]) -> Self {
        self.task.blocked_tasks = task_ids
            .iter()
            .map(|&task_id| BlockedTaskRef {
                task_id,
                due_date: None,
            })
            .collect();
        self
    }

    pub fn build(self) -> TaskSnapshot {
        self.task
    }
}

impl Default for TaskSnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test OptimizationRule entities
pub struct RuleBuilder {
    rule: OptimizationRule,
}

impl RuleBuilder {
    pub fn deadline() -> Self {
        Self::with_config("deadline", RuleConfig::Deadline(DeadlineConfig::default()))
    }

    pub fn dependency() -> Self {
        Self::with_config("dependency", RuleConfig::Dependency(DependencyConfig::default()))
    }

    pub fn pattern(keys: &[&str]) -> Self {
        Self::with_config(
            "pattern",
            RuleConfig::Pattern(SignalRuleConfig {
                signal_keys: keys.iter().map(|k| k.to_string()).collect(),
            }),
        )
    }

    pub fn context(keys: &[&str]) -> Self {
        Self::with_config(
            "context",
            RuleConfig::Context(SignalRuleConfig {
                signal_keys: keys.iter().map(|k| k.to_string()).collect(),
            }),
        )
    }

    pub fn with_config(name: &str, config: RuleConfig) -> Self {
        Self {
            rule: OptimizationRule::new(1, name, config, 0.5),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.rule.id = id;
        self
    }

    pub fn with_owner(mut self, owner_id: i64) -> Self {
        self.rule.owner_id = owner_id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.rule.name = name.to_string();
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.rule.weight = weight;
        self
    }

    pub fn with_trigger(mut self, condition: Condition) -> Self {
        self.rule.trigger_conditions.push(condition);
        self
    }

    pub fn with_exclusion(mut self, condition: Condition) -> Self {
        self.rule.exclusion_conditions.push(condition);
        self
    }

    pub fn applies_to(mut self, filters: ScopeFilters) -> Self {
        self.rule.applies_to = filters;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.rule.is_active = false;
        self
    }

    pub fn build(self) -> OptimizationRule {
        self.rule
    }
}

/// Builder for creating test OptimizationSchedule entities
pub struct ScheduleBuilder {
    schedule: OptimizationSchedule,
}

impl ScheduleBuilder {
    pub fn new(schedule_type: ScheduleType) -> Self {
        Self {
            schedule: OptimizationSchedule::new(1, "test_schedule", schedule_type),
        }
    }

    pub fn hourly() -> Self {
        Self::new(ScheduleType::Hourly)
    }

    pub fn daily_at(hour: u32, minute: u32) -> Self {
        let mut builder = Self::new(ScheduleType::Daily);
        builder.schedule.time_of_day = NaiveTime::from_hms_opt(hour, minute, 0);
        builder
    }

    pub fn on_change() -> Self {
        Self::new(ScheduleType::OnChange)
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.schedule.id = id;
        self
    }

    pub fn with_owner(mut self, owner_id: i64) -> Self {
        self.schedule.owner_id = owner_id;
        self
    }

    pub fn with_scope(mut self, scope: OptimizationScope) -> Self {
        self.schedule.scope = scope;
        self
    }

    pub fn with_filters(mut self, filters: ScopeFilters) -> Self {
        self.schedule.filters = filters;
        self
    }

    pub fn with_max_changes(mut self, max_changes: u32) -> Self {
        self.schedule.max_changes_per_run = max_changes;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.schedule.min_confidence_threshold = min_confidence;
        self
    }

    pub fn with_aggressiveness(mut self, aggressiveness: OptimizationAggressiveness) -> Self {
        self.schedule.aggressiveness = aggressiveness;
        self
    }

    pub fn next_run_at(mut self, next_run_at: DateTime<Utc>) -> Self {
        self.schedule.next_run_at = Some(next_run_at);
        self
    }

    pub fn last_run_at(mut self, last_run_at: DateTime<Utc>) -> Self {
        self.schedule.last_run_at = Some(last_run_at);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.schedule.is_active = false;
        self
    }

    pub fn build(self) -> OptimizationSchedule {
        self.schedule
    }
}

/// 构造信号集合
pub fn signals(pattern: &[(&str, f64)], context: &[(&str, f64)], sample_size: u32) -> TaskSignals {
    let map = |values: &[(&str, f64)]| SignalMap {
        values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        sample_size,
    };
    TaskSignals {
        pattern: map(pattern),
        context: map(context),
    }
}
