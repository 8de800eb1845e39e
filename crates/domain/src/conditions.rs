//! 规则触发/排除条件求值
//!
//! 字段在求值时从任务快照和信号中解析。未知字段、值类型不匹配、
//! 运算符不适用于字段类型都会返回错误，由评分器转换为规则求值错误并跳过该规则。

use chrono::{DateTime, Utc};
use serde_json::Value;

use optimizer_core::models::{Condition, ConditionOperator, Priority, TaskSignals, TaskSnapshot};

/// 条件求值所需的上下文
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub task: &'a TaskSnapshot,
    pub signals: &'a TaskSignals,
    pub now: DateTime<Utc>,
}

/// 解析后的字段值
#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Priority(Priority),
    /// 字段合法但当前任务没有该值
    Missing,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(task: &'a TaskSnapshot, signals: &'a TaskSignals, now: DateTime<Utc>) -> Self {
        Self { task, signals, now }
    }

    fn resolve(&self, field: &str) -> Result<FieldValue, String> {
        let task = self.task;

        if let Some(key) = field.strip_prefix("pattern.") {
            return Ok(self
                .signals
                .pattern
                .get(key)
                .map(FieldValue::Number)
                .unwrap_or(FieldValue::Missing));
        }
        if let Some(key) = field.strip_prefix("context.") {
            return Ok(self
                .signals
                .context
                .get(key)
                .map(FieldValue::Number)
                .unwrap_or(FieldValue::Missing));
        }

        let value = match field {
            "priority" => FieldValue::Priority(task.priority),
            "status" => FieldValue::Text(task.status.as_str().to_string()),
            "category" => task
                .category
                .clone()
                .map(FieldValue::Text)
                .unwrap_or(FieldValue::Missing),
            "project_id" => task
                .project_id
                .map(|id| FieldValue::Number(id as f64))
                .unwrap_or(FieldValue::Missing),
            "title" => FieldValue::Text(task.title.clone()),
            "due_within_hours" => task
                .hours_until_due(self.now)
                .map(FieldValue::Number)
                .unwrap_or(FieldValue::Missing),
            "hours_overdue" => task
                .hours_until_due(self.now)
                .map(|h| FieldValue::Number((-h).max(0.0)))
                .unwrap_or(FieldValue::Missing),
            "has_due_date" => FieldValue::Bool(task.due_date.is_some()),
            "is_overdue" => FieldValue::Bool(task.is_overdue(self.now)),
            "blocked_count" => FieldValue::Number(task.blocked_tasks.len() as f64),
            _ => return Err(format!("未知的条件字段: {field}")),
        };
        Ok(value)
    }
}

/// 求值单个条件
pub fn evaluate(condition: &Condition, ctx: &EvaluationContext<'_>) -> Result<bool, String> {
    let actual = ctx.resolve(&condition.field)?;
    let field = condition.field.as_str();

    match condition.operator {
        ConditionOperator::Exists => {
            let present = actual != FieldValue::Missing;
            match &condition.value {
                Value::Null => Ok(present),
                Value::Bool(expected) => Ok(present == *expected),
                other => Err(format!("字段 {field} 的 exists 条件只接受布尔值: {other}")),
            }
        }
        ConditionOperator::Eq => equals(field, &actual, &condition.value),
        ConditionOperator::Ne => equals(field, &actual, &condition.value).map(|eq| !eq),
        ConditionOperator::Gt
        | ConditionOperator::Gte
        | ConditionOperator::Lt
        | ConditionOperator::Lte => {
            let Some(ordering) = compare(field, &actual, &condition.value)? else {
                return Ok(false);
            };
            Ok(match condition.operator {
                ConditionOperator::Gt => ordering.is_gt(),
                ConditionOperator::Gte => ordering.is_ge(),
                ConditionOperator::Lt => ordering.is_lt(),
                _ => ordering.is_le(),
            })
        }
        ConditionOperator::In | ConditionOperator::NotIn => {
            let Value::Array(items) = &condition.value else {
                return Err(format!("字段 {field} 的 in/not_in 条件需要数组值"));
            };
            let mut found = false;
            for item in items {
                if equals(field, &actual, item)? {
                    found = true;
                }
            }
            Ok(if condition.operator == ConditionOperator::In {
                found
            } else {
                !found
            })
        }
        ConditionOperator::Contains => match (&actual, &condition.value) {
            (FieldValue::Text(text), Value::String(needle)) => {
                Ok(text.to_lowercase().contains(&needle.to_lowercase()))
            }
            (FieldValue::Missing, Value::String(_)) => Ok(false),
            _ => Err(format!("字段 {field} 不支持 contains 运算符")),
        },
    }
}

/// 全部条件都满足（空列表视为满足）
///
/// 所有条件都会求值，保证格式错误的条件对任何任务都会报告出来。
pub fn all_match(conditions: &[Condition], ctx: &EvaluationContext<'_>) -> Result<bool, String> {
    let mut matched = true;
    for condition in conditions {
        if !evaluate(condition, ctx)? {
            matched = false;
        }
    }
    Ok(matched)
}

/// 任意条件满足（空列表视为不满足）
pub fn any_match(conditions: &[Condition], ctx: &EvaluationContext<'_>) -> Result<bool, String> {
    let mut matched = false;
    for condition in conditions {
        if evaluate(condition, ctx)? {
            matched = true;
        }
    }
    Ok(matched)
}

fn equals(field: &str, actual: &FieldValue, expected: &Value) -> Result<bool, String> {
    match (actual, expected) {
        (FieldValue::Missing, _) => Ok(false),
        (FieldValue::Number(a), Value::Number(b)) => {
            let b = b
                .as_f64()
                .ok_or_else(|| format!("字段 {field} 的比较值不是有效数字"))?;
            Ok((a - b).abs() < f64::EPSILON)
        }
        (FieldValue::Text(a), Value::String(b)) => Ok(a == b),
        (FieldValue::Bool(a), Value::Bool(b)) => Ok(a == b),
        (FieldValue::Priority(a), Value::String(b)) => {
            let b: Priority = b
                .parse()
                .map_err(|_| format!("字段 {field} 的比较值不是有效优先级: {b}"))?;
            Ok(*a == b)
        }
        (_, other) => Err(format!("字段 {field} 的比较值类型不匹配: {other}")),
    }
}

fn compare(
    field: &str,
    actual: &FieldValue,
    expected: &Value,
) -> Result<Option<std::cmp::Ordering>, String> {
    match (actual, expected) {
        (FieldValue::Missing, Value::Number(_) | Value::String(_)) => Ok(None),
        (FieldValue::Number(a), Value::Number(b)) => {
            let b = b
                .as_f64()
                .ok_or_else(|| format!("字段 {field} 的比较值不是有效数字"))?;
            Ok(a.partial_cmp(&b))
        }
        (FieldValue::Priority(a), Value::String(b)) => {
            let b: Priority = b
                .parse()
                .map_err(|_| format!("字段 {field} 的比较值不是有效优先级: {b}"))?;
            Ok(Some(a.cmp(&b)))
        }
        (FieldValue::Text(_) | FieldValue::Bool(_), _) => {
            Err(format!("字段 {field} 不支持大小比较"))
        }
        (_, other) => Err(format!("字段 {field} 的比较值类型不匹配: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use optimizer_core::models::{BlockedTaskRef, SignalMap, TaskStatus};
    use serde_json::json;

    fn task(now: DateTime<Utc>) -> TaskSnapshot {
        TaskSnapshot {
            id: 1,
            owner_id: 1,
            title: "准备季度汇报".to_string(),
            priority: Priority::Medium,
            status: TaskStatus::Pending,
            due_date: Some(now + Duration::hours(6)),
            category: Some("work".to_string()),
            project_id: Some(42),
            blocked_tasks: vec![BlockedTaskRef {
                task_id: 2,
                due_date: None,
            }],
            updated_at: now,
        }
    }

    fn check(condition: Condition, task: &TaskSnapshot, signals: &TaskSignals) -> Result<bool, String> {
        let ctx = EvaluationContext::new(task, signals, Utc::now());
        evaluate(&condition, &ctx)
    }

    #[test]
    fn test_task_fields() {
        let now = Utc::now();
        let t = task(now);
        let signals = TaskSignals::default();

        assert!(check(Condition::new("priority", ConditionOperator::Eq, json!("medium")), &t, &signals).unwrap());
        assert!(check(Condition::new("priority", ConditionOperator::Lt, json!("high")), &t, &signals).unwrap());
        assert!(check(Condition::new("due_within_hours", ConditionOperator::Lte, json!(24)), &t, &signals).unwrap());
        assert!(check(Condition::new("blocked_count", ConditionOperator::Gte, json!(1)), &t, &signals).unwrap());
        assert!(check(Condition::new("category", ConditionOperator::In, json!(["home", "work"])), &t, &signals).unwrap());
        assert!(check(Condition::new("title", ConditionOperator::Contains, json!("季度")), &t, &signals).unwrap());
        assert!(!check(Condition::new("is_overdue", ConditionOperator::Eq, json!(true)), &t, &signals).unwrap());
        assert!(check(Condition::new("project_id", ConditionOperator::NotIn, json!([1, 2])), &t, &signals).unwrap());
    }

    #[test]
    fn test_signal_fields() {
        let now = Utc::now();
        let t = task(now);
        let mut signals = TaskSignals::default();
        signals.pattern = SignalMap {
            values: [("completion_rate".to_string(), 0.7)].into_iter().collect(),
            sample_size: 10,
        };

        assert!(check(Condition::new("pattern.completion_rate", ConditionOperator::Gt, json!(0.5)), &t, &signals).unwrap());
        assert!(check(Condition::new("context.energy", ConditionOperator::Exists, json!(false)), &t, &signals).unwrap());
        assert!(!check(Condition::new("context.energy", ConditionOperator::Gt, json!(0.1)), &t, &signals).unwrap());
    }

    #[test]
    fn test_malformed_conditions_error() {
        let now = Utc::now();
        let t = task(now);
        let signals = TaskSignals::default();

        assert!(check(Condition::new("unknown_field", ConditionOperator::Eq, json!(1)), &t, &signals).is_err());
        assert!(check(Condition::new("priority", ConditionOperator::Eq, json!(3)), &t, &signals).is_err());
        assert!(check(Condition::new("title", ConditionOperator::Gt, json!("a")), &t, &signals).is_err());
        assert!(check(Condition::new("priority", ConditionOperator::Eq, json!("critical")), &t, &signals).is_err());
        assert!(check(Condition::new("blocked_count", ConditionOperator::Contains, json!("x")), &t, &signals).is_err());
    }

    #[test]
    fn test_all_match_reports_errors_after_false() {
        let now = Utc::now();
        let t = task(now);
        let signals = TaskSignals::default();
        let ctx = EvaluationContext::new(&t, &signals, now);

        let conditions = vec![
            Condition::new("priority", ConditionOperator::Eq, json!("low")),
            Condition::new("bogus", ConditionOperator::Eq, json!(1)),
        ];
        assert!(all_match(&conditions, &ctx).is_err());
        assert!(all_match(&[], &ctx).unwrap());
        assert!(!any_match(&[], &ctx).unwrap());
    }
}
