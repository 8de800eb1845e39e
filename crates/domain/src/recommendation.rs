//! 推荐构建：把评分结果转换为带理由的优先级推荐

use std::cmp::Ordering;

use optimizer_core::models::{PriorityRecommendation, RecommendationFactor, TaskSnapshot};

use crate::scoring::ScoreOutcome;

/// 子评分达到该值时写入推荐理由
const NOTABLE_FACTOR: f64 = 0.5;

pub struct RecommendationBuilder;

impl RecommendationBuilder {
    pub fn build(task: &TaskSnapshot, outcome: &ScoreOutcome) -> PriorityRecommendation {
        let factors = Self::factors(outcome);
        PriorityRecommendation {
            task_id: task.id,
            task_title: task.title.clone(),
            current_priority: task.priority,
            recommended_priority: outcome.calculated_priority,
            priority_score: outcome.priority_score,
            confidence_level: outcome.confidence_level,
            sub_scores: outcome.sub_scores,
            reasoning: Self::reasoning(task, outcome, &factors),
            factors,
            applied_rules: outcome
                .fired_rules
                .iter()
                .map(|r| r.snapshot.rule_name.clone())
                .collect(),
        }
    }

    /// 按 评分×置信度 降序排序（相同时按任务ID升序）并截断
    pub fn rank(
        mut recommendations: Vec<PriorityRecommendation>,
        limit: usize,
    ) -> Vec<PriorityRecommendation> {
        recommendations.sort_by(|a, b| {
            b.impact()
                .partial_cmp(&a.impact())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        recommendations.truncate(limit);
        recommendations
    }

    fn factors(outcome: &ScoreOutcome) -> Vec<RecommendationFactor> {
        let s = &outcome.sub_scores;
        vec![
            RecommendationFactor {
                factor: "urgency".to_string(),
                score: s.urgency_score,
                description: "截止时间紧迫程度".to_string(),
            },
            RecommendationFactor {
                factor: "importance".to_string(),
                score: s.importance_score,
                description: "显式优先级及分类/项目权重".to_string(),
            },
            RecommendationFactor {
                factor: "context".to_string(),
                score: s.context_score,
                description: "当前上下文信号".to_string(),
            },
            RecommendationFactor {
                factor: "pattern".to_string(),
                score: s.pattern_score,
                description: "历史行为模式".to_string(),
            },
            RecommendationFactor {
                factor: "dependency".to_string(),
                score: s.dependency_score,
                description: "阻塞其他任务的程度".to_string(),
            },
        ]
    }

    /// 生成推荐理由文本
    pub fn reasoning(
        task: &TaskSnapshot,
        outcome: &ScoreOutcome,
        factors: &[RecommendationFactor],
    ) -> String {
        if !outcome.has_fired_rules() {
            return format!("没有适用的优化规则，保持{}优先级", task.priority.label());
        }

        let mut parts = Vec::new();
        if outcome.is_change() {
            parts.push(format!(
                "建议将优先级从{}调整为{}",
                task.priority.label(),
                outcome.calculated_priority.label()
            ));
        } else {
            parts.push(format!("当前{}优先级合适", task.priority.label()));
        }
        parts.push(format!(
            "综合评分 {:.2}，置信度 {:.2}",
            outcome.priority_score, outcome.confidence_level
        ));

        let notable: Vec<String> = factors
            .iter()
            .filter(|f| f.score >= NOTABLE_FACTOR)
            .map(|f| format!("{} {:.2}", f.description, f.score))
            .collect();
        if !notable.is_empty() {
            parts.push(format!("主要因素: {}", notable.join("、")));
        }
        if !task.blocked_tasks.is_empty() {
            parts.push(format!("阻塞 {} 个任务", task.blocked_tasks.len()));
        }

        parts.join("；")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::PriorityScorer;
    use chrono::{Duration, Utc};
    use optimizer_core::models::{
        DeadlineConfig, OptimizationRule, Priority, RuleConfig, TaskSignals, TaskStatus,
    };

    fn task(id: i64, due_in_hours: i64) -> TaskSnapshot {
        let now = Utc::now();
        TaskSnapshot {
            id,
            owner_id: 1,
            title: format!("任务{id}"),
            priority: Priority::Low,
            status: TaskStatus::Pending,
            due_date: Some(now + Duration::hours(due_in_hours)),
            category: None,
            project_id: None,
            blocked_tasks: vec![],
            updated_at: now,
        }
    }

    #[test]
    fn test_build_and_rank() {
        let now = Utc::now();
        let scorer = PriorityScorer::default();
        let mut rule = OptimizationRule::new(
            1,
            "截止时间",
            RuleConfig::Deadline(DeadlineConfig::default()),
            1.0,
        );
        rule.id = 1;
        let rules = vec![rule];

        let recs: Vec<_> = [(1, 100), (2, 2), (3, 30)]
            .into_iter()
            .map(|(id, hours)| {
                let t = task(id, hours);
                let outcome = scorer.score(&t, &TaskSignals::default(), &rules, now);
                RecommendationBuilder::build(&t, &outcome)
            })
            .collect();

        let ranked = RecommendationBuilder::rank(recs, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].task_id, 2);
        assert_eq!(ranked[1].task_id, 3);
        assert_eq!(ranked[0].recommended_priority, Priority::Urgent);
        assert!(ranked[0].is_change());
        assert!(ranked[0].reasoning.contains("紧急"));
        assert_eq!(ranked[0].applied_rules, vec!["截止时间".to_string()]);
        assert_eq!(ranked[0].factors.len(), 5);
    }

    #[test]
    fn test_reasoning_without_rules() {
        let now = Utc::now();
        let t = task(1, 5);
        let outcome = PriorityScorer::default().score(&t, &TaskSignals::default(), &[], now);
        let rec = RecommendationBuilder::build(&t, &outcome);
        assert!(rec.reasoning.contains("没有适用的优化规则"));
        assert!(!rec.is_change());
    }
}
