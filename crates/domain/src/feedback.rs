//! 反馈跟踪：记录用户对优化结果的接受/拒绝，回滚变更，并维护规则统计
//!
//! 规则权重从不自动调整，success_rate 只用于展示。

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use optimizer_core::models::{ActivityEvent, ActivityKind, OptimizationHistory};
use optimizer_core::traits::{ActivityLog, HistoryRepository, RuleRepository, TaskStore};
use optimizer_core::{OptimizerError, OptimizerResult};

/// 回滚且此前没有反馈时写入的拒绝说明
const REVERT_FEEDBACK: &str = "用户回滚了该变更";

pub struct FeedbackTracker {
    history_repo: Arc<dyn HistoryRepository>,
    rule_repo: Arc<dyn RuleRepository>,
    task_store: Arc<dyn TaskStore>,
    activity_log: Arc<dyn ActivityLog>,
}

impl FeedbackTracker {
    pub fn new(
        history_repo: Arc<dyn HistoryRepository>,
        rule_repo: Arc<dyn RuleRepository>,
        task_store: Arc<dyn TaskStore>,
        activity_log: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            history_repo,
            rule_repo,
            task_store,
            activity_log,
        }
    }

    /// 记录用户反馈，每条历史只能记录一次
    pub async fn record_feedback(
        &self,
        owner_id: i64,
        history_id: i64,
        accepted: bool,
        feedback: Option<String>,
    ) -> OptimizerResult<OptimizationHistory> {
        let history = self.get_history(owner_id, history_id).await?;
        if history.has_feedback() {
            return Err(OptimizerError::FeedbackAlreadyRecorded { id: history_id });
        }

        self.write_feedback(&history, accepted, feedback.as_deref())
            .await?;
        info!(
            owner_id,
            history_id,
            accepted,
            task_id = history.task_id,
            "Recorded optimization feedback"
        );

        self.get_history(owner_id, history_id).await
    }

    /// 回滚一次优先级变更
    ///
    /// 恢复旧优先级并标记回滚时间；此前没有反馈时记为一次拒绝。
    pub async fn revert(&self, owner_id: i64, history_id: i64) -> OptimizerResult<OptimizationHistory> {
        let history = self.get_history(owner_id, history_id).await?;
        if history.is_reverted() {
            return Err(OptimizerError::AlreadyReverted { id: history_id });
        }

        self.task_store
            .set_priority(owner_id, history.task_id, history.old_priority)
            .await?;

        let now = Utc::now();
        if !self.history_repo.mark_reverted(history_id, now).await? {
            return Err(OptimizerError::AlreadyReverted { id: history_id });
        }

        if !history.has_feedback() {
            match self
                .write_feedback(&history, false, Some(REVERT_FEEDBACK))
                .await
            {
                // 并发写入的反馈优先
                Ok(()) | Err(OptimizerError::FeedbackAlreadyRecorded { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        self.activity_log.record(ActivityEvent {
            kind: ActivityKind::PriorityReverted,
            owner_id,
            task_id: history.task_id,
            history_id,
            old_priority: history.new_priority,
            new_priority: history.old_priority,
            occurred_at: now,
        });
        info!(
            owner_id,
            history_id,
            task_id = history.task_id,
            restored_priority = %history.old_priority,
            "Reverted priority change"
        );

        self.get_history(owner_id, history_id).await
    }

    async fn write_feedback(
        &self,
        history: &OptimizationHistory,
        accepted: bool,
        feedback: Option<&str>,
    ) -> OptimizerResult<()> {
        let written = self
            .history_repo
            .record_feedback(history.id, accepted, feedback, Utc::now())
            .await?;
        if !written {
            return Err(OptimizerError::FeedbackAlreadyRecorded { id: history.id });
        }

        for snapshot in &history.applied_rules {
            if !self
                .rule_repo
                .record_outcome(snapshot.rule_id, accepted)
                .await?
            {
                warn!(
                    rule_id = snapshot.rule_id,
                    history_id = history.id,
                    "Rule no longer exists, skipping feedback statistics"
                );
            }
        }
        Ok(())
    }

    async fn get_history(&self, owner_id: i64, id: i64) -> OptimizerResult<OptimizationHistory> {
        self.history_repo
            .get_by_id(owner_id, id)
            .await?
            .ok_or(OptimizerError::HistoryNotFound { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optimizer_core::models::{AppliedRuleSnapshot, Priority, RuleType};
    use optimizer_testing_utils::{
        MockHistoryRepository, MockRuleRepository, MockTaskStore, RecordingActivityLog,
        RuleBuilder, TaskSnapshotBuilder,
    };

    struct Fixture {
        tracker: FeedbackTracker,
        rules: MockRuleRepository,
        store: MockTaskStore,
        activity: RecordingActivityLog,
        history_id: i64,
        rule_id: i64,
    }

    async fn fixture() -> Fixture {
        let rules = MockRuleRepository::new();
        let history = MockHistoryRepository::new();
        let store = MockTaskStore::with_tasks(vec![TaskSnapshotBuilder::new()
            .with_id(10)
            .with_priority(Priority::Urgent)
            .build()]);
        let activity = RecordingActivityLog::new();

        let rule = rules
            .create(&RuleBuilder::deadline().with_weight(0.8).build())
            .await
            .unwrap();
        let record = history
            .create(&OptimizationHistory {
                id: 0,
                owner_id: 1,
                task_id: 10,
                job_id: Some(1),
                old_priority: Priority::Medium,
                new_priority: Priority::Urgent,
                priority_score: 0.9,
                confidence_level: 0.5,
                reasoning: "截止时间临近".to_string(),
                applied_rules: vec![
                    AppliedRuleSnapshot {
                        rule_id: rule.id,
                        rule_name: rule.name.clone(),
                        rule_type: RuleType::DeadlineBased,
                        weight: 0.8,
                        contribution: 0.9,
                    },
                    AppliedRuleSnapshot {
                        rule_id: 999,
                        rule_name: "已删除".to_string(),
                        rule_type: RuleType::ContextBased,
                        weight: 0.2,
                        contribution: 0.1,
                    },
                ],
                user_accepted: None,
                user_feedback: None,
                feedback_at: None,
                reverted_at: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        Fixture {
            tracker: FeedbackTracker::new(
                Arc::new(history),
                Arc::new(rules.clone()),
                Arc::new(store.clone()),
                Arc::new(activity.clone()),
            ),
            rules,
            store,
            activity,
            history_id: record.id,
            rule_id: rule.id,
        }
    }

    #[tokio::test]
    async fn test_feedback_updates_rule_statistics_once() {
        let f = fixture().await;

        let history = f
            .tracker
            .record_feedback(1, f.history_id, true, Some("很准".to_string()))
            .await
            .unwrap();
        assert_eq!(history.user_accepted, Some(true));
        assert!(history.feedback_at.is_some());

        let rule = f.rules.get(f.rule_id).unwrap();
        assert_eq!(rule.times_applied, 1);
        assert_eq!(rule.success_count, 1);
        assert_eq!(rule.success_rate, 1.0);

        let second = f.tracker.record_feedback(1, f.history_id, false, None).await;
        assert!(matches!(
            second,
            Err(OptimizerError::FeedbackAlreadyRecorded { .. })
        ));
        assert_eq!(f.rules.get(f.rule_id).unwrap().times_applied, 1);
    }

    #[tokio::test]
    async fn test_revert_restores_priority_once() {
        let f = fixture().await;

        let history = f.tracker.revert(1, f.history_id).await.unwrap();
        assert!(history.reverted_at.is_some());
        assert_eq!(history.user_accepted, Some(false));
        assert_eq!(f.store.priority_of(10), Some(Priority::Medium));

        let rule = f.rules.get(f.rule_id).unwrap();
        assert_eq!(rule.times_applied, 1);
        assert_eq!(rule.success_count, 0);

        let events = f.activity.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ActivityKind::PriorityReverted);

        let again = f.tracker.revert(1, f.history_id).await;
        assert!(matches!(again, Err(OptimizerError::AlreadyReverted { .. })));
    }

    #[tokio::test]
    async fn test_revert_after_feedback_keeps_feedback() {
        let f = fixture().await;
        f.tracker
            .record_feedback(1, f.history_id, true, None)
            .await
            .unwrap();

        let history = f.tracker.revert(1, f.history_id).await.unwrap();
        assert_eq!(history.user_accepted, Some(true));
        assert_eq!(f.rules.get(f.rule_id).unwrap().times_applied, 1);
    }

    #[tokio::test]
    async fn test_unknown_history_is_not_found() {
        let f = fixture().await;
        assert!(matches!(
            f.tracker.revert(2, f.history_id).await,
            Err(OptimizerError::HistoryNotFound { .. })
        ));
    }
}
