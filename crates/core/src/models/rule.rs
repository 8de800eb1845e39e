use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Condition, ScopeFilters};
use crate::errors::{OptimizerError, OptimizerResult};

/// 规则类型
///
/// 未识别的类型保留原始名称，以便前向兼容。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleType {
    DeadlineBased,
    DependencyBased,
    PatternBased,
    ContextBased,
    Custom(String),
}

impl RuleType {
    pub fn as_str(&self) -> &str {
        match self {
            RuleType::DeadlineBased => "deadline_based",
            RuleType::DependencyBased => "dependency_based",
            RuleType::PatternBased => "pattern_based",
            RuleType::ContextBased => "context_based",
            RuleType::Custom(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, RuleType::Custom(_))
    }
}

impl From<String> for RuleType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "deadline_based" => RuleType::DeadlineBased,
            "dependency_based" => RuleType::DependencyBased,
            "pattern_based" => RuleType::PatternBased,
            "context_based" => RuleType::ContextBased,
            _ => RuleType::Custom(value),
        }
    }
}

impl From<RuleType> for String {
    fn from(value: RuleType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 截止时间规则配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DeadlineConfig {
    /// 为真时，没有截止时间的任务不触发该规则
    #[serde(default)]
    pub ignore_undated: bool,
}

/// 依赖规则配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencyConfig {
    /// 阻塞任务数低于此值时不触发
    #[serde(default)]
    pub min_blocked_tasks: usize,
    /// 每个被阻塞任务贡献的分值，累加后截断到1
    #[serde(default = "default_per_blocked_task")]
    pub per_blocked_task: f64,
}

fn default_per_blocked_task() -> f64 {
    0.25
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            min_blocked_tasks: 0,
            per_blocked_task: default_per_blocked_task(),
        }
    }
}

/// 模式/上下文规则配置：读取哪些信号键，为空表示全部
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SignalRuleConfig {
    #[serde(default)]
    pub signal_keys: Vec<String>,
}

/// 按规则类型区分的强类型配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRuleConfig", into = "RawRuleConfig")]
pub enum RuleConfig {
    Deadline(DeadlineConfig),
    Dependency(DependencyConfig),
    Pattern(SignalRuleConfig),
    Context(SignalRuleConfig),
    /// 未识别规则类型的原始配置，评分时跳过
    Raw {
        rule_type: String,
        config: serde_json::Value,
    },
}

/// 规则配置的存储/传输形态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRuleConfig {
    pub rule_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl RuleConfig {
    /// 从规则类型名称和原始JSON构造配置
    pub fn from_parts(rule_type: &str, config: serde_json::Value) -> OptimizerResult<Self> {
        // 空配置使用各类型默认值
        let config = if config.is_null() {
            serde_json::json!({})
        } else {
            config
        };
        let invalid = |e: serde_json::Error| {
            OptimizerError::Validation(format!("规则类型 {rule_type} 的配置无效: {e}"))
        };

        Ok(match RuleType::from(rule_type.to_string()) {
            RuleType::DeadlineBased => {
                RuleConfig::Deadline(serde_json::from_value(config).map_err(invalid)?)
            }
            RuleType::DependencyBased => {
                RuleConfig::Dependency(serde_json::from_value(config).map_err(invalid)?)
            }
            RuleType::PatternBased => {
                RuleConfig::Pattern(serde_json::from_value(config).map_err(invalid)?)
            }
            RuleType::ContextBased => {
                RuleConfig::Context(serde_json::from_value(config).map_err(invalid)?)
            }
            RuleType::Custom(name) => RuleConfig::Raw {
                rule_type: name,
                config,
            },
        })
    }

    pub fn rule_type(&self) -> RuleType {
        match self {
            RuleConfig::Deadline(_) => RuleType::DeadlineBased,
            RuleConfig::Dependency(_) => RuleType::DependencyBased,
            RuleConfig::Pattern(_) => RuleType::PatternBased,
            RuleConfig::Context(_) => RuleType::ContextBased,
            RuleConfig::Raw { rule_type, .. } => RuleType::Custom(rule_type.clone()),
        }
    }

    /// 配置部分的JSON表示（不含类型名）
    pub fn config_value(&self) -> serde_json::Value {
        let value = match self {
            RuleConfig::Deadline(c) => serde_json::to_value(c),
            RuleConfig::Dependency(c) => serde_json::to_value(c),
            RuleConfig::Pattern(c) | RuleConfig::Context(c) => serde_json::to_value(c),
            RuleConfig::Raw { config, .. } => return config.clone(),
        };
        value.unwrap_or(serde_json::Value::Null)
    }
}

impl TryFrom<RawRuleConfig> for RuleConfig {
    type Error = OptimizerError;

    fn try_from(raw: RawRuleConfig) -> Result<Self, Self::Error> {
        RuleConfig::from_parts(&raw.rule_type, raw.config)
    }
}

impl From<RuleConfig> for RawRuleConfig {
    fn from(config: RuleConfig) -> Self {
        RawRuleConfig {
            rule_type: config.rule_type().to_string(),
            config: config.config_value(),
        }
    }
}

/// 优化规则
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizationRule {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub config: RuleConfig,
    pub weight: f64,
    #[serde(default)]
    pub trigger_conditions: Vec<Condition>,
    #[serde(default)]
    pub exclusion_conditions: Vec<Condition>,
    /// 规则适用的分类/项目/优先级范围
    #[serde(default)]
    pub applies_to: ScopeFilters,
    pub is_active: bool,
    pub times_applied: i64,
    pub success_count: i64,
    pub success_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OptimizationRule {
    pub fn new(owner_id: i64, name: &str, config: RuleConfig, weight: f64) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由数据库生成
            owner_id,
            name: name.to_string(),
            description: None,
            config,
            weight,
            trigger_conditions: vec![],
            exclusion_conditions: vec![],
            applies_to: ScopeFilters::default(),
            is_active: true,
            times_applied: 0,
            success_count: 0,
            success_rate: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn rule_type(&self) -> RuleType {
        self.config.rule_type()
    }

    /// 写入前校验
    pub fn validate(&self) -> OptimizerResult<()> {
        if self.name.trim().is_empty() {
            return Err(OptimizerError::Validation("规则名称不能为空".to_string()));
        }
        if !self.weight.is_finite() || !(0.0..=1.0).contains(&self.weight) {
            return Err(OptimizerError::Validation(format!(
                "规则权重必须在 [0,1] 区间内: {}",
                self.weight
            )));
        }
        if let RuleConfig::Dependency(c) = &self.config {
            if !c.per_blocked_task.is_finite() || c.per_blocked_task < 0.0 {
                return Err(OptimizerError::Validation(
                    "per_blocked_task 必须为非负数".to_string(),
                ));
            }
        }
        for condition in self
            .trigger_conditions
            .iter()
            .chain(self.exclusion_conditions.iter())
        {
            condition.validate()?;
        }
        Ok(())
    }

    /// 记录一次反馈并重新计算成功率
    pub fn record_outcome(&mut self, success: bool) {
        self.times_applied += 1;
        if success {
            self.success_count += 1;
        }
        self.success_rate = self.success_count as f64 / self.times_applied as f64;
    }

    pub fn snapshot(&self, contribution: f64) -> AppliedRuleSnapshot {
        AppliedRuleSnapshot {
            rule_id: self.id,
            rule_name: self.name.clone(),
            rule_type: self.rule_type(),
            weight: self.weight,
            contribution,
        }
    }
}

/// 应用时刻的规则快照，保证历史记录不受后续权重修改影响
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppliedRuleSnapshot {
    pub rule_id: i64,
    pub rule_name: String,
    pub rule_type: RuleType,
    pub weight: f64,
    pub contribution: f64,
}
