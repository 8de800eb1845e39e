//! 规则注册表：用户维度的优化规则管理

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use optimizer_core::models::{
    Condition, OptimizationRule, RuleConfig, RuleType, ScopeFilters,
};
use optimizer_core::traits::{HistoryRepository, RuleRepository};
use optimizer_core::{OptimizerError, OptimizerResult};

/// 创建/更新规则的输入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub rule_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
    pub weight: f64,
    #[serde(default)]
    pub trigger_conditions: Vec<Condition>,
    #[serde(default)]
    pub exclusion_conditions: Vec<Condition>,
    #[serde(default)]
    pub applies_to: ScopeFilters,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// 删除规则的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDeletion {
    /// 规则被历史记录引用，只做停用
    Disabled,
    Deleted,
}

pub struct RuleRegistry {
    rule_repo: Arc<dyn RuleRepository>,
    history_repo: Arc<dyn HistoryRepository>,
}

impl RuleRegistry {
    pub fn new(
        rule_repo: Arc<dyn RuleRepository>,
        history_repo: Arc<dyn HistoryRepository>,
    ) -> Self {
        Self {
            rule_repo,
            history_repo,
        }
    }

    pub async fn create(&self, owner_id: i64, draft: RuleDraft) -> OptimizerResult<OptimizationRule> {
        let config = RuleConfig::from_parts(&draft.rule_type, draft.config.clone())?;
        let mut rule = OptimizationRule::new(owner_id, &draft.name, config, draft.weight);
        Self::apply_draft(&mut rule, draft);
        Self::validate(&rule)?;

        let created = self.rule_repo.create(&rule).await?;
        info!(
            owner_id,
            rule_id = created.id,
            rule_type = %created.rule_type(),
            weight = created.weight,
            "Created optimization rule"
        );
        Ok(created)
    }

    pub async fn get(&self, owner_id: i64, id: i64) -> OptimizerResult<OptimizationRule> {
        self.rule_repo
            .get_by_id(owner_id, id)
            .await?
            .ok_or(OptimizerError::RuleNotFound { id })
    }

    pub async fn list(&self, owner_id: i64) -> OptimizerResult<Vec<OptimizationRule>> {
        self.rule_repo.list(owner_id).await
    }

    /// 更新规则定义，反馈统计保持不变
    pub async fn update(
        &self,
        owner_id: i64,
        id: i64,
        draft: RuleDraft,
    ) -> OptimizerResult<OptimizationRule> {
        let mut rule = self.get(owner_id, id).await?;
        rule.config = RuleConfig::from_parts(&draft.rule_type, draft.config.clone())?;
        rule.name = draft.name.clone();
        rule.weight = draft.weight;
        Self::apply_draft(&mut rule, draft);
        rule.updated_at = Utc::now();
        Self::validate(&rule)?;

        self.rule_repo.update(&rule).await?;
        info!(owner_id, rule_id = id, weight = rule.weight, "Updated optimization rule");
        Ok(rule)
    }

    pub async fn set_active(
        &self,
        owner_id: i64,
        id: i64,
        is_active: bool,
    ) -> OptimizerResult<OptimizationRule> {
        let mut rule = self.get(owner_id, id).await?;
        if rule.is_active != is_active {
            rule.is_active = is_active;
            rule.updated_at = Utc::now();
            self.rule_repo.update(&rule).await?;
        }
        debug!(owner_id, rule_id = id, is_active, "Toggled optimization rule");
        Ok(rule)
    }

    /// 删除规则；被历史记录引用时改为停用
    pub async fn delete(&self, owner_id: i64, id: i64) -> OptimizerResult<RuleDeletion> {
        let mut rule = self.get(owner_id, id).await?;

        if self.history_repo.is_rule_referenced(id).await? {
            rule.is_active = false;
            rule.updated_at = Utc::now();
            self.rule_repo.update(&rule).await?;
            info!(owner_id, rule_id = id, "Rule referenced by history, disabled instead of deleted");
            return Ok(RuleDeletion::Disabled);
        }

        self.rule_repo.delete(owner_id, id).await?;
        info!(owner_id, rule_id = id, "Deleted optimization rule");
        Ok(RuleDeletion::Deleted)
    }

    /// 与过滤条件有交集的启用规则
    pub async fn active_rules_for(
        &self,
        owner_id: i64,
        filters: &ScopeFilters,
    ) -> OptimizerResult<Vec<OptimizationRule>> {
        let rules = self.rule_repo.list_active(owner_id).await?;
        Ok(rules
            .into_iter()
            .filter(|r| r.applies_to.overlaps(filters))
            .collect())
    }

    fn apply_draft(rule: &mut OptimizationRule, draft: RuleDraft) {
        rule.description = draft.description;
        rule.trigger_conditions = draft.trigger_conditions;
        rule.exclusion_conditions = draft.exclusion_conditions;
        rule.applies_to = draft.applies_to;
        if let Some(is_active) = draft.is_active {
            rule.is_active = is_active;
        }
    }

    fn validate(rule: &OptimizationRule) -> OptimizerResult<()> {
        rule.validate()?;
        if let RuleConfig::Raw { rule_type, .. } = &rule.config {
            if RuleType::from(rule_type.clone()).is_known() {
                return Err(OptimizerError::Validation(format!(
                    "规则类型 {rule_type} 必须使用结构化配置"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optimizer_core::models::{AppliedRuleSnapshot, OptimizationHistory, Priority};
    use optimizer_testing_utils::{MockHistoryRepository, MockRuleRepository};
    use serde_json::json;

    fn registry() -> (RuleRegistry, MockRuleRepository, MockHistoryRepository) {
        let rules = MockRuleRepository::new();
        let history = MockHistoryRepository::new();
        (
            RuleRegistry::new(Arc::new(rules.clone()), Arc::new(history.clone())),
            rules,
            history,
        )
    }

    fn draft(rule_type: &str, weight: f64) -> RuleDraft {
        RuleDraft {
            name: "截止时间优先".to_string(),
            description: None,
            rule_type: rule_type.to_string(),
            config: json!({}),
            weight,
            trigger_conditions: vec![],
            exclusion_conditions: vec![],
            applies_to: ScopeFilters::default(),
            is_active: None,
        }
    }

    #[tokio::test]
    async fn test_create_validates_weight() {
        let (registry, _, _) = registry();
        assert!(matches!(
            registry.create(1, draft("deadline_based", 1.2)).await,
            Err(OptimizerError::Validation(_))
        ));

        let rule = registry.create(1, draft("deadline_based", 0.8)).await.unwrap();
        assert!(rule.id > 0);
        assert!(rule.is_active);
    }

    #[tokio::test]
    async fn test_unknown_type_kept_as_raw() {
        let (registry, _, _) = registry();
        let rule = registry.create(1, draft("energy_based", 0.3)).await.unwrap();
        assert_eq!(rule.rule_type(), RuleType::Custom("energy_based".to_string()));
    }

    #[tokio::test]
    async fn test_owner_isolation() {
        let (registry, _, _) = registry();
        let rule = registry.create(1, draft("deadline_based", 0.5)).await.unwrap();
        assert!(matches!(
            registry.get(2, rule.id).await,
            Err(OptimizerError::RuleNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_keeps_statistics() {
        let (registry, rules, _) = registry();
        let rule = registry.create(1, draft("deadline_based", 0.5)).await.unwrap();
        rules.record_outcome(rule.id, true).await.unwrap();

        let updated = registry
            .update(1, rule.id, draft("deadline_based", 0.9))
            .await
            .unwrap();
        assert_eq!(updated.weight, 0.9);
        assert_eq!(updated.times_applied, 1);
        assert_eq!(updated.success_count, 1);
    }

    #[tokio::test]
    async fn test_delete_referenced_rule_disables_it() {
        let (registry, rules, history) = registry();
        let referenced = registry.create(1, draft("deadline_based", 0.5)).await.unwrap();
        let unused = registry.create(1, draft("deadline_based", 0.5)).await.unwrap();

        history
            .create(&OptimizationHistory {
                id: 0,
                owner_id: 1,
                task_id: 10,
                job_id: None,
                old_priority: Priority::Low,
                new_priority: Priority::High,
                priority_score: 0.6,
                confidence_level: 0.7,
                reasoning: String::new(),
                applied_rules: vec![AppliedRuleSnapshot {
                    rule_id: referenced.id,
                    rule_name: referenced.name.clone(),
                    rule_type: referenced.rule_type(),
                    weight: 0.5,
                    contribution: 0.6,
                }],
                user_accepted: None,
                user_feedback: None,
                feedback_at: None,
                reverted_at: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(registry.delete(1, referenced.id).await.unwrap(), RuleDeletion::Disabled);
        assert!(!rules.get(referenced.id).unwrap().is_active);

        assert_eq!(registry.delete(1, unused.id).await.unwrap(), RuleDeletion::Deleted);
        assert!(rules.get(unused.id).is_none());
    }

    #[tokio::test]
    async fn test_active_rules_for_filters() {
        let (registry, _, _) = registry();
        let mut work = draft("deadline_based", 0.5);
        work.applies_to.categories = vec!["work".to_string()];
        registry.create(1, work).await.unwrap();
        let mut inactive = draft("deadline_based", 0.5);
        inactive.is_active = Some(false);
        registry.create(1, inactive).await.unwrap();
        registry.create(1, draft("dependency_based", 0.5)).await.unwrap();

        let home = ScopeFilters {
            categories: vec!["home".to_string()],
            ..Default::default()
        };
        let rules = registry.active_rules_for(1, &home).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].rule_type(), RuleType::DependencyBased);

        let all = registry.active_rules_for(1, &ScopeFilters::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
