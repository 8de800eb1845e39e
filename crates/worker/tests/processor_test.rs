use std::sync::Arc;
use std::time::Duration;

use optimizer_core::config::ScoringConfig;
use optimizer_core::models::{
    ActivityKind, JobParameters, JobStatus, JobTrigger, OptimizationJob, OptimizationScope,
    Priority, RuleConfig, ScopeFilters, TaskOutcome, TaskQuery, TaskSnapshot, TaskStatus,
};
use optimizer_core::traits::{JobRepository, RuleRepository};
use optimizer_core::OptimizerError;
use optimizer_domain::PriorityScorer;
use optimizer_infrastructure::{MetricsCollector, Repositories};
use optimizer_testing_utils::{
    MockHistoryRepository, MockJobRepository, MockRuleRepository, MockScheduleRepository,
    MockScoreRepository, MockSignalAggregator, MockTaskStore, RecordingActivityLog, RuleBuilder,
    TaskSnapshotBuilder, TestEnv,
};
use optimizer_worker::{
    fetch_all_pages, CancellationFlag, JobProcessor, ProcessorSettings, ScheduleLeases,
    WorkerPool,
};

struct Fixture {
    processor: Arc<JobProcessor>,
    rules: MockRuleRepository,
    scores: MockScoreRepository,
    history: MockHistoryRepository,
    jobs: MockJobRepository,
    tasks: MockTaskStore,
    activity: RecordingActivityLog,
    leases: ScheduleLeases,
}

fn settings() -> ProcessorSettings {
    ProcessorSettings {
        page_size: 4,
        scoring_concurrency: 3,
        apply_concurrency: 2,
        retry_backoff: Duration::from_millis(1),
        max_error_details: 20,
        progress_update_every: 2,
        job_timeout: Duration::from_secs(10),
    }
}

fn fixture(
    tasks: Vec<TaskSnapshot>,
    signals: MockSignalAggregator,
    settings: ProcessorSettings,
) -> Fixture {
    let rules = MockRuleRepository::new();
    let scores = MockScoreRepository::new();
    let history = MockHistoryRepository::new();
    let jobs = MockJobRepository::new();
    let task_store = MockTaskStore::with_tasks(tasks);
    let activity = RecordingActivityLog::new();
    let leases = ScheduleLeases::new();

    let repos = Repositories {
        rules: Arc::new(rules.clone()),
        scores: Arc::new(scores.clone()),
        history: Arc::new(history.clone()),
        schedules: Arc::new(MockScheduleRepository::new()),
        jobs: Arc::new(jobs.clone()),
        tasks: Arc::new(task_store.clone()),
        signals: Arc::new(signals),
    };
    // 单条规则即给满置信度，方便构造可应用的变更
    let scorer = PriorityScorer::new(ScoringConfig {
        min_fired_rules: 1,
        ..ScoringConfig::default()
    });

    let processor = JobProcessor::new(
        &repos,
        Arc::new(activity.clone()),
        scorer,
        settings,
        leases.clone(),
        Arc::new(MetricsCollector::new()),
    );

    Fixture {
        processor: Arc::new(processor),
        rules,
        scores,
        history,
        jobs,
        tasks: task_store,
        activity,
        leases,
    }
}

/// 前 `urgent` 个任务一小时后到期，其余没有截止时间；全部为低优先级
fn mixed_tasks(total: i64, urgent: i64) -> Vec<TaskSnapshot> {
    (1..=total)
        .map(|id| {
            let builder = TaskSnapshotBuilder::new()
                .with_id(id)
                .with_priority(Priority::Low);
            if id <= urgent {
                builder.due_in_hours(1).build()
            } else {
                builder.build()
            }
        })
        .collect()
}

impl Fixture {
    async fn add_deadline_rule(&self) {
        self.rules
            .create(&RuleBuilder::deadline().with_weight(0.8).build())
            .await
            .unwrap();
    }

    async fn create_job(&self, schedule_id: Option<i64>, max_changes: u32) -> OptimizationJob {
        let params = JobParameters {
            max_changes_per_run: max_changes,
            min_confidence_threshold: 0.5,
            ..JobParameters::default()
        };
        self.jobs
            .create(&OptimizationJob::new(1, schedule_id, JobTrigger::Manual, params))
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_change_cap_defers_remaining_candidates() {
    let f = fixture(mixed_tasks(10, 5), MockSignalAggregator::new(), settings());
    f.add_deadline_rule().await;
    let job = f.create_job(None, 3).await;

    let result = f
        .processor
        .run_job(job, CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(result.job.status, JobStatus::Completed);
    assert_eq!(result.job.tasks_analyzed, 10);
    assert_eq!(result.job.priorities_changed, 3);
    assert_eq!(result.job.progress_percentage, 100.0);
    assert_eq!(result.count(TaskOutcome::Applied), 3);
    assert_eq!(result.count(TaskOutcome::Deferred), 2);
    assert_eq!(result.results.len(), 10);

    assert_eq!(f.history.all().len(), 3);
    assert_eq!(f.tasks.set_priority_calls().len(), 3);
    let events = f.activity.events();
    assert_eq!(events.len(), 3);
    assert!(events
        .iter()
        .all(|e| e.kind == ActivityKind::PriorityChanged && e.new_priority == Priority::Urgent));

    let stored = f.jobs.get(result.job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.priorities_changed, 3);
}

#[tokio::test]
async fn test_change_cap_applies_highest_impact_tasks() {
    // 任务ID越大截止时间越近，评分越高
    let tasks = (1..=5)
        .map(|id| {
            TaskSnapshotBuilder::new()
                .with_id(id)
                .with_priority(Priority::Low)
                .due_in_hours(6 - id)
                .build()
        })
        .collect();
    let f = fixture(tasks, MockSignalAggregator::new(), settings());
    f.add_deadline_rule().await;

    let result = f
        .processor
        .run_job(f.create_job(None, 3).await, CancellationFlag::new())
        .await
        .unwrap();

    let ids_with = |outcome: TaskOutcome| {
        let mut ids: Vec<i64> = result
            .results
            .iter()
            .filter(|r| r.outcome == outcome)
            .map(|r| r.task_id)
            .collect();
        ids.sort();
        ids
    };
    assert_eq!(ids_with(TaskOutcome::Applied), vec![3, 4, 5]);
    assert_eq!(ids_with(TaskOutcome::Deferred), vec![1, 2]);

    let applied_min = result
        .results
        .iter()
        .filter(|r| r.outcome == TaskOutcome::Applied)
        .map(|r| r.priority_score * r.confidence_level)
        .fold(f64::MAX, f64::min);
    let deferred_max = result
        .results
        .iter()
        .filter(|r| r.outcome == TaskOutcome::Deferred)
        .map(|r| r.priority_score * r.confidence_level)
        .fold(f64::MIN, f64::max);
    assert!(applied_min > deferred_max);
    assert_eq!(f.tasks.priority_of(1), Some(Priority::Low));
    assert_eq!(f.tasks.priority_of(5), Some(Priority::Urgent));
}

#[tokio::test]
async fn test_history_write_failure_restores_priority() {
    let f = fixture(mixed_tasks(1, 1), MockSignalAggregator::new(), settings());
    f.add_deadline_rule().await;
    f.history.fail_create(true);

    let first = f
        .processor
        .run_job(f.create_job(None, 5).await, CancellationFlag::new())
        .await
        .unwrap();
    assert_eq!(first.job.status, JobStatus::Completed);
    assert_eq!(first.job.errors_count, 1);
    assert_eq!(first.count(TaskOutcome::Failed), 1);
    assert_eq!(f.tasks.priority_of(1), Some(Priority::Low));
    assert_eq!(
        f.tasks.set_priority_calls(),
        vec![(1, Priority::Urgent), (1, Priority::Low)]
    );
    assert!(f.history.all().is_empty());
    assert!(f.activity.events().is_empty());

    // 历史记录恢复后下一次运行会重新应用这个变更
    f.history.fail_create(false);
    let second = f
        .processor
        .run_job(f.create_job(None, 5).await, CancellationFlag::new())
        .await
        .unwrap();
    assert_eq!(second.count(TaskOutcome::Applied), 1);
    assert_eq!(f.history.all().len(), 1);
    assert_eq!(f.tasks.priority_of(1), Some(Priority::Urgent));
}

#[tokio::test]
async fn test_paging_stops_when_store_ignores_limits() {
    let store = MockTaskStore::with_tasks(mixed_tasks(6, 6));
    store.ignore_paging(true);
    let query = TaskQuery::new(1, OptimizationScope::default(), ScopeFilters::default());

    let oversized = tokio::time::timeout(
        Duration::from_secs(1),
        fetch_all_pages(&store, &query, 4),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(oversized.len(), 6);

    let repeated = tokio::time::timeout(
        Duration::from_secs(1),
        fetch_all_pages(&store, &query, 6),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(repeated.len(), 6);

    store.ignore_paging(false);
    let paged = fetch_all_pages(&store, &query, 4).await.unwrap();
    let ids: Vec<i64> = paged.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn test_second_run_only_applies_remaining_changes() {
    let f = fixture(mixed_tasks(6, 4), MockSignalAggregator::new(), settings());
    f.add_deadline_rule().await;

    let first = f
        .processor
        .run_job(f.create_job(None, 10).await, CancellationFlag::new())
        .await
        .unwrap();
    assert_eq!(first.job.priorities_changed, 4);

    let second = f
        .processor
        .run_job(f.create_job(None, 10).await, CancellationFlag::new())
        .await
        .unwrap();
    assert_eq!(second.job.status, JobStatus::Completed);
    assert_eq!(second.job.priorities_changed, 0);
    assert_eq!(second.count(TaskOutcome::Unchanged), 4);
    assert_eq!(f.history.all().len(), 4);

    // 每个任务只保留一条当前评分
    for id in 1..=6 {
        assert_eq!(f.scores.current_count(1, id), 1);
    }
    assert_eq!(f.scores.all().len(), 12);
}

#[tokio::test]
async fn test_closed_tasks_are_not_candidates() {
    let mut tasks = mixed_tasks(3, 3);
    tasks[2].status = TaskStatus::Completed;
    let f = fixture(tasks, MockSignalAggregator::new(), settings());
    f.add_deadline_rule().await;

    let result = f
        .processor
        .run_job(f.create_job(None, 10).await, CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(result.job.tasks_analyzed, 2);
    assert_eq!(f.tasks.priority_of(3), Some(Priority::Low));
}

#[tokio::test]
async fn test_without_rules_nothing_changes() {
    let f = fixture(mixed_tasks(3, 3), MockSignalAggregator::new(), settings());

    let result = f
        .processor
        .run_job(f.create_job(None, 10).await, CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(result.job.status, JobStatus::Completed);
    assert_eq!(result.count(TaskOutcome::NoRules), 3);
    assert!(f.tasks.set_priority_calls().is_empty());
}

#[tokio::test]
async fn test_transient_write_failure_is_retried() {
    let f = fixture(mixed_tasks(2, 2), MockSignalAggregator::new(), settings());
    f.add_deadline_rule().await;
    f.tasks.fail_set_priority(1, 1);

    let result = f
        .processor
        .run_job(f.create_job(None, 10).await, CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(result.job.priorities_changed, 2);
    assert_eq!(result.job.errors_count, 0);
    assert_eq!(f.tasks.priority_of(1), Some(Priority::Urgent));
}

#[tokio::test]
async fn test_persistent_write_failure_is_isolated() {
    let f = fixture(mixed_tasks(3, 3), MockSignalAggregator::new(), settings());
    f.add_deadline_rule().await;
    f.tasks.fail_set_priority(2, 2);

    let result = f
        .processor
        .run_job(f.create_job(None, 10).await, CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(result.job.status, JobStatus::Completed);
    assert_eq!(result.job.priorities_changed, 2);
    assert_eq!(result.job.errors_count, 1);
    assert_eq!(result.job.error_details[0].task_id, Some(2));
    assert_eq!(result.count(TaskOutcome::Failed), 1);
    assert_eq!(f.tasks.priority_of(2), Some(Priority::Low));
    assert!(f.history.all().iter().all(|h| h.task_id != 2));
}

#[tokio::test]
async fn test_candidate_enumeration_failure_fails_job() {
    let f = fixture(mixed_tasks(3, 3), MockSignalAggregator::new(), settings());
    f.add_deadline_rule().await;
    f.tasks.fail_get_tasks(true);
    let job = f.create_job(None, 10).await;
    let job_id = job.id;

    let err = f
        .processor
        .run_job(job, CancellationFlag::new())
        .await
        .unwrap_err();

    assert!(matches!(err, OptimizerError::FatalJob(_)));
    let stored = f.jobs.get(job_id).unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error_details[0].error_type, "fatal_job");
}

#[tokio::test]
async fn test_cancelled_job_ends_failed_without_changes() {
    let f = fixture(mixed_tasks(4, 4), MockSignalAggregator::new(), settings());
    f.add_deadline_rule().await;
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let result = f
        .processor
        .run_job(f.create_job(None, 10).await, cancel)
        .await
        .unwrap();

    assert_eq!(result.job.status, JobStatus::Failed);
    assert_eq!(result.job.error_details[0].message, "cancelled");
    assert!(f.tasks.set_priority_calls().is_empty());
}

#[tokio::test]
async fn test_job_timeout_marks_job_failed() {
    let mut short = settings();
    short.scoring_concurrency = 1;
    short.job_timeout = Duration::from_millis(100);
    let slow = MockSignalAggregator::new().with_delay(Duration::from_millis(300));
    let f = fixture(mixed_tasks(3, 3), slow, short);
    f.add_deadline_rule().await;

    let result = f
        .processor
        .run_job(f.create_job(None, 10).await, CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(result.job.status, JobStatus::Failed);
    assert_eq!(result.job.error_details[0].error_type, "timeout");
    assert!(f.tasks.set_priority_calls().is_empty());
}

#[tokio::test]
async fn test_schedule_lease_conflict() {
    let f = fixture(mixed_tasks(2, 2), MockSignalAggregator::new(), settings());
    f.add_deadline_rule().await;
    let _held = f.leases.try_acquire(7).unwrap();
    let job = f.create_job(Some(7), 10).await;
    let job_id = job.id;

    let err = f
        .processor
        .run_job(job, CancellationFlag::new())
        .await
        .unwrap_err();

    assert!(matches!(err, OptimizerError::JobAlreadyActive { schedule_id: 7 }));
    assert_eq!(f.jobs.get(job_id).unwrap().status, JobStatus::Failed);
    assert!(f.tasks.set_priority_calls().is_empty());
}

#[tokio::test]
async fn test_lease_released_after_job() {
    let f = fixture(mixed_tasks(1, 1), MockSignalAggregator::new(), settings());
    let result = f
        .processor
        .run_job(f.create_job(Some(3), 10).await, CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(result.job.status, JobStatus::Completed);
    assert!(!f.leases.is_held(3));
}

#[tokio::test]
async fn test_malformed_rule_is_reported_once() {
    let f = fixture(mixed_tasks(4, 4), MockSignalAggregator::new(), settings());
    f.add_deadline_rule().await;
    f.rules
        .create(
            &RuleBuilder::with_config(
                "broken",
                RuleConfig::Raw {
                    rule_type: "seasonal".to_string(),
                    config: serde_json::json!({ "month": 12 }),
                },
            )
            .build(),
        )
        .await
        .unwrap();

    let result = f
        .processor
        .run_job(f.create_job(None, 10).await, CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(result.job.status, JobStatus::Completed);
    assert_eq!(result.job.priorities_changed, 4);
    assert_eq!(result.job.errors_count, 1);
    assert_eq!(result.job.error_details[0].error_type, "rule_evaluation");
}

#[tokio::test]
async fn test_worker_pool_runs_submitted_jobs() {
    TestEnv::init_tracing();
    let f = fixture(mixed_tasks(5, 5), MockSignalAggregator::new(), settings());
    f.add_deadline_rule().await;
    let pool = WorkerPool::start(f.processor.clone(), 2, 4, Arc::new(MetricsCollector::new()));

    let job = f.create_job(None, 10).await;
    let job_id = job.id;
    pool.submit(job).await.unwrap();

    let jobs = f.jobs.clone();
    let finished = TestEnv::wait_for(
        || {
            let jobs = jobs.clone();
            async move { jobs.get(job_id).is_some_and(|j| j.is_finished()) }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(finished);
    assert_eq!(f.jobs.get(job_id).unwrap().priorities_changed, 5);

    pool.shutdown().await;
    assert_eq!(pool.queue_depth(), 0);
}

#[tokio::test]
async fn test_worker_pool_cancels_running_job() {
    let mut slow_settings = settings();
    slow_settings.scoring_concurrency = 1;
    let slow = MockSignalAggregator::new().with_delay(Duration::from_millis(50));
    let f = fixture(mixed_tasks(40, 40), slow, slow_settings);
    f.add_deadline_rule().await;
    let pool = WorkerPool::start(f.processor.clone(), 1, 4, Arc::new(MetricsCollector::new()));

    let job = f.create_job(None, 50).await;
    let job_id = job.id;
    pool.submit(job).await.unwrap();

    let jobs = f.jobs.clone();
    let started = TestEnv::wait_for(
        || {
            let jobs = jobs.clone();
            async move { jobs.get(job_id).is_some_and(|j| j.status == JobStatus::Running) }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(started);
    assert!(pool.cancel(job_id).await);

    let finished = TestEnv::wait_for(
        || {
            let jobs = jobs.clone();
            async move { jobs.get(job_id).is_some_and(|j| j.is_finished()) }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(finished);
    let stored = f.jobs.get(job_id).unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.tasks_analyzed < 40);
    assert!(f.tasks.set_priority_calls().is_empty());

    pool.shutdown().await;
}
