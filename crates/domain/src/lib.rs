//! # optimizer-domain
//!
//! 优先级优化的领域逻辑：
//!
//! - [`scoring`] 纯函数评分器，计算子评分、综合评分和置信度
//! - [`conditions`] 规则触发/排除条件求值
//! - [`recommendation`] 评分结果到推荐的转换
//! - [`rule_registry`] 规则的增删改查与校验
//! - [`feedback`] 用户反馈与回滚
//! - [`stats`] 优化效果统计

pub mod conditions;
pub mod feedback;
pub mod recommendation;
pub mod rule_registry;
pub mod scoring;
pub mod stats;

pub use feedback::FeedbackTracker;
pub use recommendation::RecommendationBuilder;
pub use rule_registry::{RuleDeletion, RuleDraft, RuleRegistry};
pub use scoring::{FiredRule, PriorityScorer, ScoreOutcome};
pub use stats::StatsService;
