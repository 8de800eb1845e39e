use serde::{Deserialize, Serialize};

use crate::errors::{OptimizerError, OptimizerResult};

/// 条件比较运算符
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Contains,
    Exists,
}

/// 规则的触发/排除条件
///
/// `field` 取值见评分模块的字段表，例如 `priority`、`due_within_hours`、
/// `pattern.completion_rate`。字段在求值时解析，未知字段只会让该规则被跳过。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Condition {
    pub fn new(field: &str, operator: ConditionOperator, value: serde_json::Value) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
        }
    }

    /// 写入时的结构校验
    pub fn validate(&self) -> OptimizerResult<()> {
        if self.field.trim().is_empty() {
            return Err(OptimizerError::Validation("条件字段不能为空".to_string()));
        }
        match self.operator {
            ConditionOperator::In | ConditionOperator::NotIn if !self.value.is_array() => {
                Err(OptimizerError::Validation(format!(
                    "条件 {} 的 {:?} 运算符需要数组值",
                    self.field, self.operator
                )))
            }
            ConditionOperator::Exists => Ok(()),
            _ if self.value.is_null() => Err(OptimizerError::Validation(format!(
                "条件 {} 缺少比较值",
                self.field
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_condition_validation() {
        assert!(Condition::new("priority", ConditionOperator::Eq, json!("high"))
            .validate()
            .is_ok());
        assert!(Condition::new("category", ConditionOperator::In, json!("work"))
            .validate()
            .is_err());
        assert!(Condition::new("", ConditionOperator::Exists, json!(null))
            .validate()
            .is_err());
        assert!(Condition::new("due_within_hours", ConditionOperator::Lt, json!(null))
            .validate()
            .is_err());
    }

    #[test]
    fn test_condition_deserialize() {
        let condition: Condition = serde_json::from_value(json!({
            "field": "blocked_count",
            "operator": "gte",
            "value": 2
        }))
        .unwrap();
        assert_eq!(condition.operator, ConditionOperator::Gte);
    }
}
