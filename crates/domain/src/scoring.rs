//! # 优先级评分器
//!
//! 对单个任务计算五个子评分、综合评分和置信度。评分是纯计算：
//! 不做I/O、不持有可变状态，当前时间由调用方传入，因此同一输入总得到同一输出，
//! 可以安全地并行评分多个任务。
//!
//! ## 规则触发
//!
//! 规则在以下条件全部满足时"触发"：
//!
//! 1. 规则处于启用状态且权重大于0
//! 2. `applies_to` 覆盖任务的分类/项目/优先级
//! 3. 所有触发条件满足
//! 4. 没有任何排除条件满足（排除条件与权重无关）
//!
//! 触发规则按类型贡献对应子评分，综合评分为 Σ权重·贡献 / Σ权重。
//!
//! ## 紧急度曲线
//!
//! ```text
//! 剩余小时:  ≤0    4     24    72    horizon
//! 紧急度:    1.0   0.85  0.7   0.45  0.0
//! ```

use chrono::{DateTime, Utc};
use tracing::warn;

use optimizer_core::config::ScoringConfig;
use optimizer_core::models::{
    AppliedRuleSnapshot, DependencyConfig, OptimizationRule, Priority, RuleConfig, RuleType,
    SignalMap, SubScores, TaskPriorityScore, TaskSignals, TaskSnapshot,
};
use optimizer_core::OptimizerError;

use crate::conditions::{all_match, any_match, EvaluationContext};

/// 紧急度曲线的固定拐点 (剩余小时, 紧急度)，最后一段延伸到 horizon
const URGENCY_KNOTS: [(f64, f64); 4] = [(0.0, 1.0), (4.0, 0.85), (24.0, 0.7), (72.0, 0.45)];

/// 截止时间规则的置信度
const DEADLINE_CONFIDENCE_DATED: f64 = 1.0;
const DEADLINE_CONFIDENCE_UNDATED: f64 = 0.4;
/// 依赖规则的置信度
const DEPENDENCY_CONFIDENCE_BLOCKING: f64 = 0.9;
const DEPENDENCY_CONFIDENCE_FREE: f64 = 0.5;

/// 触发规则及其贡献
#[derive(Debug, Clone, PartialEq)]
pub struct FiredRule {
    pub snapshot: AppliedRuleSnapshot,
    pub confidence: f64,
}

/// 单个任务的评分结果
#[derive(Debug)]
pub struct ScoreOutcome {
    pub task_id: i64,
    pub owner_id: i64,
    pub current_priority: Priority,
    pub calculated_priority: Priority,
    pub priority_score: f64,
    pub confidence_level: f64,
    pub sub_scores: SubScores,
    pub fired_rules: Vec<FiredRule>,
    /// 被跳过的规则及原因
    pub rule_errors: Vec<OptimizerError>,
}

impl ScoreOutcome {
    pub fn has_fired_rules(&self) -> bool {
        !self.fired_rules.is_empty()
    }

    pub fn is_change(&self) -> bool {
        self.calculated_priority != self.current_priority
    }

    /// 排序依据：综合评分 × 置信度
    pub fn impact(&self) -> f64 {
        self.priority_score * self.confidence_level
    }

    pub fn applied_rules(&self) -> Vec<AppliedRuleSnapshot> {
        self.fired_rules.iter().map(|r| r.snapshot.clone()).collect()
    }

    /// 转换为待持久化的当前评分记录
    pub fn to_record(&self, job_id: Option<i64>, calculated_at: DateTime<Utc>) -> TaskPriorityScore {
        TaskPriorityScore {
            id: 0,
            task_id: self.task_id,
            owner_id: self.owner_id,
            job_id,
            calculated_priority: self.calculated_priority,
            priority_score: self.priority_score,
            confidence_level: self.confidence_level,
            sub_scores: self.sub_scores,
            is_current: true,
            calculated_at,
        }
    }
}

/// 优先级评分器
#[derive(Debug, Clone, Default)]
pub struct PriorityScorer {
    config: ScoringConfig,
}

impl PriorityScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// 计算任务评分
    pub fn score(
        &self,
        task: &TaskSnapshot,
        signals: &TaskSignals,
        rules: &[OptimizationRule],
        now: DateTime<Utc>,
    ) -> ScoreOutcome {
        let ctx = EvaluationContext::new(task, signals, now);
        let urgency = self.urgency(task, now);
        let default_dependency = self.dependency(task, &DependencyConfig::default(), now);

        let mut fired = Vec::new();
        let mut rule_errors = Vec::new();
        // (类型, 贡献) 用于汇总子评分
        let mut contributions: Vec<(RuleType, f64)> = Vec::new();

        let mut ordered: Vec<&OptimizationRule> = rules.iter().collect();
        ordered.sort_by_key(|r| r.id);

        for rule in ordered {
            if !rule.is_active || rule.weight <= 0.0 || !rule.weight.is_finite() {
                continue;
            }
            if !rule.applies_to.matches_task(task) {
                continue;
            }

            match self.evaluate_rule(rule, task, signals, &ctx, urgency, now) {
                Ok(Some((contribution, confidence))) => {
                    contributions.push((rule.rule_type(), contribution));
                    fired.push(FiredRule {
                        snapshot: rule.snapshot(contribution),
                        confidence,
                    });
                }
                Ok(None) => {}
                Err(message) => {
                    warn!(
                        rule_id = rule.id,
                        task_id = task.id,
                        error = %message,
                        "Skipping rule that failed to evaluate"
                    );
                    rule_errors.push(OptimizerError::RuleEvaluation {
                        rule_id: rule.id,
                        message,
                    });
                }
            }
        }

        let sub_scores = SubScores {
            urgency_score: urgency,
            importance_score: self.importance(task),
            context_score: Self::signal_sub_score(&contributions, &RuleType::ContextBased),
            pattern_score: Self::signal_sub_score(&contributions, &RuleType::PatternBased),
            dependency_score: contributions
                .iter()
                .filter(|(t, _)| *t == RuleType::DependencyBased)
                .map(|(_, c)| *c)
                .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.max(c))))
                .unwrap_or(default_dependency),
        };

        if fired.is_empty() {
            return ScoreOutcome {
                task_id: task.id,
                owner_id: task.owner_id,
                current_priority: task.priority,
                calculated_priority: task.priority,
                priority_score: 0.0,
                confidence_level: 0.0,
                sub_scores,
                fired_rules: fired,
                rule_errors,
            };
        }

        let total_weight: f64 = fired.iter().map(|r| r.snapshot.weight).sum();
        let weighted: f64 = fired
            .iter()
            .map(|r| r.snapshot.weight * r.snapshot.contribution)
            .sum();
        let priority_score = (weighted / total_weight).clamp(0.0, 1.0);

        let mean_confidence =
            fired.iter().map(|r| r.confidence).sum::<f64>() / fired.len() as f64;
        let sparse_factor = if fired.len() < self.config.min_fired_rules {
            fired.len() as f64 / self.config.min_fired_rules as f64
        } else {
            1.0
        };
        let confidence_level = (mean_confidence * sparse_factor).clamp(0.0, 1.0);

        ScoreOutcome {
            task_id: task.id,
            owner_id: task.owner_id,
            current_priority: task.priority,
            calculated_priority: Priority::from_score(priority_score),
            priority_score,
            confidence_level,
            sub_scores,
            fired_rules: fired,
            rule_errors,
        }
    }

    /// 求值单条规则，返回 (贡献, 置信度)；未触发时返回 `None`
    fn evaluate_rule(
        &self,
        rule: &OptimizationRule,
        task: &TaskSnapshot,
        signals: &TaskSignals,
        ctx: &EvaluationContext<'_>,
        urgency: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<(f64, f64)>, String> {
        // 先计算配置相关的贡献，未识别的规则类型直接报错
        let (contribution, confidence, type_gate) = match &rule.config {
            RuleConfig::Deadline(config) => {
                let dated = task.due_date.is_some();
                let confidence = if dated {
                    DEADLINE_CONFIDENCE_DATED
                } else {
                    DEADLINE_CONFIDENCE_UNDATED
                };
                (urgency, confidence, dated || !config.ignore_undated)
            }
            RuleConfig::Dependency(config) => {
                let blocking = !task.blocked_tasks.is_empty();
                let confidence = if blocking {
                    DEPENDENCY_CONFIDENCE_BLOCKING
                } else {
                    DEPENDENCY_CONFIDENCE_FREE
                };
                (
                    self.dependency(task, config, now),
                    confidence,
                    task.blocked_tasks.len() >= config.min_blocked_tasks,
                )
            }
            // 缺少信号数据时规则不触发
            RuleConfig::Pattern(config) => {
                match self.signal_contribution(&signals.pattern, &config.signal_keys) {
                    Some((c, conf)) => (c, conf, true),
                    None => (0.0, 0.0, false),
                }
            }
            RuleConfig::Context(config) => {
                match self.signal_contribution(&signals.context, &config.signal_keys) {
                    Some((c, conf)) => (c, conf, true),
                    None => (0.0, 0.0, false),
                }
            }
            RuleConfig::Raw { rule_type, .. } => {
                return Err(format!("不支持的规则类型: {rule_type}"));
            }
        };

        let triggered = all_match(&rule.trigger_conditions, ctx)?;
        let excluded = any_match(&rule.exclusion_conditions, ctx)?;

        if !type_gate || !triggered || excluded {
            return Ok(None);
        }
        Ok(Some((contribution, confidence)))
    }

    /// 紧急度子评分
    pub fn urgency(&self, task: &TaskSnapshot, now: DateTime<Utc>) -> f64 {
        if task.status.is_closed() {
            return 0.0;
        }
        match task.hours_until_due(now) {
            None => self.config.undated_urgency,
            Some(hours) => self.urgency_for_hours(hours),
        }
    }

    /// 按剩余小时数计算紧急度，随截止时间临近单调递增
    pub fn urgency_for_hours(&self, hours: f64) -> f64 {
        if hours <= 0.0 {
            return 1.0;
        }
        let horizon = self.config.urgency_horizon_hours;
        if hours >= horizon {
            return 0.0;
        }

        let mut knots: Vec<(f64, f64)> = URGENCY_KNOTS.to_vec();
        knots.push((horizon, 0.0));

        for window in knots.windows(2) {
            let (h0, u0) = window[0];
            let (h1, u1) = window[1];
            if hours <= h1 {
                let t = (hours - h0) / (h1 - h0);
                return (u0 + (u1 - u0) * t).clamp(0.0, 1.0);
            }
        }
        0.0
    }

    /// 重要度子评分：显式优先级与分类/项目权重取最大值
    pub fn importance(&self, task: &TaskSnapshot) -> f64 {
        let mut importance = task.priority.importance();
        if let Some(weight) = task
            .category
            .as_deref()
            .and_then(|c| self.config.category_weight(c))
        {
            importance = importance.max(weight);
        }
        if let Some(weight) = task.project_id.and_then(|p| self.config.project_weight(p)) {
            importance = importance.max(weight);
        }
        importance.clamp(0.0, 1.0)
    }

    /// 依赖子评分：阻塞数量与被阻塞任务的最高紧急度各占一半
    pub fn dependency(
        &self,
        task: &TaskSnapshot,
        config: &DependencyConfig,
        now: DateTime<Utc>,
    ) -> f64 {
        if task.blocked_tasks.is_empty() {
            return 0.0;
        }
        let count_part =
            (task.blocked_tasks.len() as f64 * config.per_blocked_task).clamp(0.0, 1.0);
        let urgency_part = task
            .blocked_tasks
            .iter()
            .map(|blocked| match blocked.due_date {
                Some(due) => self.urgency_for_hours((due - now).num_seconds() as f64 / 3600.0),
                None => self.config.undated_urgency,
            })
            .fold(0.0, f64::max);

        (0.5 * count_part + 0.5 * urgency_part).clamp(0.0, 1.0)
    }

    fn signal_contribution(&self, signals: &SignalMap, keys: &[String]) -> Option<(f64, f64)> {
        signals.mean_of(keys).map(|mean| {
            let confidence = (signals.sample_size as f64
                / self.config.full_confidence_samples as f64)
                .clamp(0.0, 1.0);
            (mean, confidence)
        })
    }

    /// 同类型触发规则贡献的平均值，没有触发规则时为0
    fn signal_sub_score(contributions: &[(RuleType, f64)], rule_type: &RuleType) -> f64 {
        let values: Vec<f64> = contributions
            .iter()
            .filter(|(t, _)| t == rule_type)
            .map(|(_, c)| *c)
            .collect();
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }
}
