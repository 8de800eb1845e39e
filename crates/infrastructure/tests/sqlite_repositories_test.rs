use chrono::{Duration, Utc};
use serde_json::json;

use optimizer_core::models::{
    AppliedRuleSnapshot, JobErrorDetail, JobParameters, JobStatus, JobTrigger, OptimizationHistory,
    OptimizationJob, OptimizationScope, Priority, RuleConfig, RuleType, ScopeFilters, SubScores,
    TaskPriorityScore, TaskQuery, TaskStatus,
};
use optimizer_core::traits::{SignalAggregator, TaskStore};
use optimizer_core::OptimizerError;
use optimizer_infrastructure::{
    DatabaseManager, SignalKind, SqliteSignalAggregator, SqliteTaskStore,
};
use optimizer_testing_utils::{RuleBuilder, ScheduleBuilder, TaskSnapshotBuilder};

async fn setup() -> DatabaseManager {
    DatabaseManager::in_memory()
        .await
        .expect("Failed to create in-memory database")
}

fn history(task_id: i64, rule_id: i64) -> OptimizationHistory {
    OptimizationHistory {
        id: 0,
        owner_id: 1,
        task_id,
        job_id: Some(1),
        old_priority: Priority::Low,
        new_priority: Priority::High,
        priority_score: 0.7,
        confidence_level: 0.8,
        reasoning: "截止时间临近".to_string(),
        applied_rules: vec![AppliedRuleSnapshot {
            rule_id,
            rule_name: "deadline".to_string(),
            rule_type: RuleType::DeadlineBased,
            weight: 0.8,
            contribution: 0.7,
        }],
        user_accepted: None,
        user_feedback: None,
        feedback_at: None,
        reverted_at: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_rule_repository_roundtrip() {
    let db = setup().await;
    let repos = db.repositories();

    let rule = repos
        .rules
        .create(
            &RuleBuilder::deadline()
                .with_weight(0.8)
                .applies_to(ScopeFilters {
                    categories: vec!["work".to_string()],
                    ..Default::default()
                })
                .build(),
        )
        .await
        .unwrap();
    assert!(rule.id > 0);
    assert_eq!(rule.rule_type(), RuleType::DeadlineBased);
    assert_eq!(rule.applies_to.categories, vec!["work".to_string()]);

    let raw = RuleConfig::from_parts("energy_based", json!({"threshold": 3})).unwrap();
    let custom = repos
        .rules
        .create(&RuleBuilder::with_config("energy", raw).inactive().build())
        .await
        .unwrap();
    let loaded = repos.rules.get_by_id(1, custom.id).await.unwrap().unwrap();
    assert_eq!(loaded.rule_type(), RuleType::Custom("energy_based".to_string()));
    assert_eq!(loaded.config.config_value(), json!({"threshold": 3}));

    assert_eq!(repos.rules.list(1).await.unwrap().len(), 2);
    assert_eq!(repos.rules.list_active(1).await.unwrap().len(), 1);
    assert!(repos.rules.get_by_id(2, rule.id).await.unwrap().is_none());

    assert!(repos.rules.record_outcome(rule.id, true).await.unwrap());
    assert!(repos.rules.record_outcome(rule.id, false).await.unwrap());
    assert!(!repos.rules.record_outcome(9999, true).await.unwrap());
    let stats = repos.rules.get_by_id(1, rule.id).await.unwrap().unwrap();
    assert_eq!(stats.times_applied, 2);
    assert_eq!(stats.success_count, 1);
    assert!((stats.success_rate - 0.5).abs() < 1e-9);

    repos.rules.delete(1, custom.id).await.unwrap();
    assert!(matches!(
        repos.rules.delete(1, custom.id).await,
        Err(OptimizerError::RuleNotFound { .. })
    ));
}

#[tokio::test]
async fn test_score_repository_keeps_single_current_row() {
    let db = setup().await;
    let repos = db.repositories();

    let score = |value: f64| TaskPriorityScore {
        id: 0,
        task_id: 10,
        owner_id: 1,
        job_id: None,
        calculated_priority: Priority::from_score(value),
        priority_score: value,
        confidence_level: 0.9,
        sub_scores: SubScores {
            urgency_score: value,
            ..Default::default()
        },
        is_current: true,
        calculated_at: Utc::now(),
    };

    repos.scores.save_current(&score(0.3)).await.unwrap();
    repos.scores.save_current(&score(0.6)).await.unwrap();
    let latest = repos.scores.save_current(&score(0.8)).await.unwrap();

    let all = repos.scores.list_for_task(1, 10).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all.iter().filter(|s| s.is_current).count(), 1);

    let current = repos.scores.get_current(1, 10).await.unwrap().unwrap();
    assert_eq!(current.id, latest.id);
    assert_eq!(current.calculated_priority, Priority::Urgent);
    assert_eq!(current.sub_scores.urgency_score, 0.8);
}

#[tokio::test]
async fn test_history_feedback_and_revert_are_write_once() {
    let db = setup().await;
    let repos = db.repositories();

    let created = repos.history.create(&history(10, 7)).await.unwrap();
    assert_eq!(created.applied_rules.len(), 1);

    let now = Utc::now();
    assert!(repos
        .history
        .record_feedback(created.id, true, Some("很准"), now)
        .await
        .unwrap());
    assert!(!repos
        .history
        .record_feedback(created.id, false, None, now)
        .await
        .unwrap());

    assert!(repos.history.mark_reverted(created.id, now).await.unwrap());
    assert!(!repos.history.mark_reverted(created.id, now).await.unwrap());

    let loaded = repos.history.get_by_id(1, created.id).await.unwrap().unwrap();
    assert_eq!(loaded.user_accepted, Some(true));
    assert_eq!(loaded.user_feedback.as_deref(), Some("很准"));
    assert!(loaded.reverted_at.is_some());

    assert!(repos.history.is_rule_referenced(7).await.unwrap());
    assert!(!repos.history.is_rule_referenced(8).await.unwrap());
    assert_eq!(repos.history.list_by_job(1).await.unwrap().len(), 1);
    assert!(repos.history.get_by_id(2, created.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_history_list_limit() {
    let db = setup().await;
    let repos = db.repositories();
    for task_id in 1..=5 {
        repos.history.create(&history(task_id, 1)).await.unwrap();
    }

    assert_eq!(repos.history.list(1, None).await.unwrap().len(), 5);
    let limited = repos.history.list(1, Some(2)).await.unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].task_id, 5);
}

#[tokio::test]
async fn test_schedule_repository_due_and_on_change() {
    let db = setup().await;
    let repos = db.repositories();
    let now = Utc::now();

    let due = repos
        .schedules
        .create(&ScheduleBuilder::daily_at(9, 30).next_run_at(now - Duration::minutes(5)).build())
        .await
        .unwrap();
    repos
        .schedules
        .create(&ScheduleBuilder::hourly().next_run_at(now + Duration::minutes(30)).build())
        .await
        .unwrap();
    repos
        .schedules
        .create(
            &ScheduleBuilder::hourly()
                .next_run_at(now - Duration::minutes(5))
                .inactive()
                .build(),
        )
        .await
        .unwrap();
    let on_change = repos
        .schedules
        .create(&ScheduleBuilder::on_change().build())
        .await
        .unwrap();

    let due_list = repos.schedules.get_due(now).await.unwrap();
    assert_eq!(due_list.len(), 1);
    assert_eq!(due_list[0].id, due.id);
    assert_eq!(due_list[0].time_of_day, due.time_of_day);

    let on_change_list = repos.schedules.list_on_change(1).await.unwrap();
    assert_eq!(on_change_list.len(), 1);
    assert_eq!(on_change_list[0].id, on_change.id);

    repos
        .schedules
        .update_run_times(due.id, Some(now), Some(now + Duration::days(1)))
        .await
        .unwrap();
    assert!(repos.schedules.get_due(now).await.unwrap().is_empty());
    assert_eq!(repos.schedules.list(1).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_job_repository_lifecycle() {
    let db = setup().await;
    let repos = db.repositories();

    let params = JobParameters {
        task_ids: Some(vec![1, 2]),
        ..Default::default()
    };
    let mut job = repos
        .jobs
        .create(&OptimizationJob::new(1, Some(3), JobTrigger::Scheduled, params.clone()))
        .await
        .unwrap();
    assert_eq!(job.parameters, params);

    let active = repos.jobs.find_active_for_schedule(3).await.unwrap();
    assert_eq!(active.map(|j| j.id), Some(job.id));

    job.update_status(JobStatus::Running);
    job.tasks_analyzed = 2;
    job.push_error(JobErrorDetail::new(Some(1), "persistence", "写入失败"), 10);
    job.update_status(JobStatus::Failed);
    repos.jobs.update(&job).await.unwrap();

    let loaded = repos.jobs.get_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Failed);
    assert_eq!(loaded.tasks_analyzed, 2);
    assert_eq!(loaded.error_details.len(), 1);
    assert!(loaded.completed_at.is_some());
    assert!(repos.jobs.find_active_for_schedule(3).await.unwrap().is_none());

    let retry = repos
        .jobs
        .create(&OptimizationJob::retry_from(&loaded))
        .await
        .unwrap();
    assert_eq!(retry.retry_of, Some(job.id));
    assert_eq!(retry.trigger, JobTrigger::Retry);

    assert_eq!(repos.jobs.count(1, None).await.unwrap(), 2);
    assert_eq!(repos.jobs.count(1, Some(JobStatus::Failed)).await.unwrap(), 1);
    assert_eq!(repos.jobs.list(1, Some(1)).await.unwrap()[0].id, retry.id);
}

#[tokio::test]
async fn test_task_store_queries_and_priority_writes() {
    let db = setup().await;
    let store = SqliteTaskStore::new(db.pool().clone());

    store
        .upsert_task(&TaskSnapshotBuilder::new().with_id(1).due_in_hours(-2).with_category("work").build())
        .await
        .unwrap();
    store
        .upsert_task(
            &TaskSnapshotBuilder::new()
                .with_id(2)
                .with_status(TaskStatus::InProgress)
                .due_in_hours(10)
                .build(),
        )
        .await
        .unwrap();
    store
        .upsert_task(&TaskSnapshotBuilder::new().with_id(3).with_status(TaskStatus::Completed).build())
        .await
        .unwrap();
    store
        .upsert_task(&TaskSnapshotBuilder::new().with_id(4).with_owner(2).build())
        .await
        .unwrap();
    store.add_dependency(1, 2).await.unwrap();
    store.add_dependency(1, 3).await.unwrap();

    let all = store
        .get_tasks(&TaskQuery::new(1, OptimizationScope::All, ScopeFilters::default()))
        .await
        .unwrap();
    assert_eq!(all.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2]);
    // 已完成的下游任务不计入
    assert_eq!(all[0].blocked_tasks.len(), 1);
    assert_eq!(all[0].blocked_tasks[0].task_id, 2);
    assert!(all[0].blocked_tasks[0].due_date.is_some());

    let overdue = store
        .get_tasks(&TaskQuery::new(1, OptimizationScope::Overdue, ScopeFilters::default()))
        .await
        .unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id, 1);

    let active = store
        .get_tasks(&TaskQuery::new(1, OptimizationScope::Active, ScopeFilters::default()))
        .await
        .unwrap();
    assert_eq!(active.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2]);

    let work = store
        .get_tasks(&TaskQuery::new(
            1,
            OptimizationScope::All,
            ScopeFilters {
                categories: vec!["work".to_string()],
                ..Default::default()
            },
        ))
        .await
        .unwrap();
    assert_eq!(work.len(), 1);

    let page = store
        .get_tasks(&TaskQuery::new(1, OptimizationScope::All, ScopeFilters::default()).page(1, 1))
        .await
        .unwrap();
    assert_eq!(page.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2]);

    let by_id = store
        .get_tasks(
            &TaskQuery::new(1, OptimizationScope::All, ScopeFilters::default())
                .with_task_ids(Some(vec![2, 4])),
        )
        .await
        .unwrap();
    assert_eq!(by_id.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2]);

    store.set_priority(1, 2, Priority::Urgent).await.unwrap();
    let task = store.get_task(1, 2).await.unwrap().unwrap();
    assert_eq!(task.priority, Priority::Urgent);

    assert!(matches!(
        store.set_priority(1, 4, Priority::Low).await,
        Err(OptimizerError::TaskNotFound { id: 4 })
    ));
}

#[tokio::test]
async fn test_signal_aggregator_reads_signal_maps() {
    let db = setup().await;
    let signals = SqliteSignalAggregator::new(db.pool().clone());

    signals
        .upsert_signal(1, 10, SignalKind::Pattern, "completion_rate", 0.8, 12)
        .await
        .unwrap();
    signals
        .upsert_signal(1, 10, SignalKind::Context, "focus", 0.6, 4)
        .await
        .unwrap();
    signals
        .upsert_signal(1, 10, SignalKind::Context, "focus", 0.9, 6)
        .await
        .unwrap();

    let loaded = signals.signals_for(1, 10).await.unwrap();
    assert_eq!(loaded.pattern.get("completion_rate"), Some(0.8));
    assert_eq!(loaded.pattern.sample_size, 12);
    assert_eq!(loaded.context.get("focus"), Some(0.9));
    assert_eq!(loaded.context.sample_size, 6);

    let empty = signals.signals_for(2, 10).await.unwrap();
    assert!(empty.pattern.is_empty());
    assert!(empty.context.is_empty());
}
