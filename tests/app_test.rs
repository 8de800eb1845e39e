use std::io::Write;
use std::time::Duration;

use optimizer_core::config::AppConfig;
use optimizer_core::models::{JobStatus, Priority, ScopeFilters};
use optimizer_dispatcher::OptimizeRequest;
use optimizer_domain::RuleDraft;
use optimizer_infrastructure::{DatabaseManager, SqliteTaskStore};
use optimizer_testing_utils::TaskSnapshotBuilder;
use priority_optimizer::{AppMode, Application, ShutdownManager};
use tempfile::NamedTempFile;

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.scoring.min_fired_rules = 1;
    config.worker.retry_backoff_ms = 1;
    config.coordinator.scan_interval_seconds = 1;
    config.observability.metrics_enabled = false;
    config
}

async fn seeded_database() -> DatabaseManager {
    let database = DatabaseManager::in_memory().await.unwrap();
    let store = SqliteTaskStore::new(database.pool().clone());
    for id in 1..=3 {
        store
            .upsert_task(
                &TaskSnapshotBuilder::new()
                    .with_id(id)
                    .with_priority(Priority::Low)
                    .due_in_hours(1)
                    .build(),
            )
            .await
            .unwrap();
    }
    database
}

#[tokio::test]
async fn test_manual_optimization_against_sqlite() {
    let app = Application::with_database(
        test_config(),
        AppMode::Coordinator,
        seeded_database().await,
        None,
    );
    let service = app.service();

    service
        .create_rule(
            1,
            RuleDraft {
                name: "deadline".to_string(),
                description: Some("截止时间临近的任务提高优先级".to_string()),
                rule_type: "deadline_based".to_string(),
                config: Default::default(),
                weight: 0.8,
                trigger_conditions: vec![],
                exclusion_conditions: vec![],
                applies_to: ScopeFilters::default(),
                is_active: None,
            },
        )
        .await
        .unwrap();

    let request = OptimizeRequest {
        task_ids: None,
        max_changes: 2,
        min_confidence: 0.5,
        aggressiveness: None,
    };
    let response = service.optimize(1, request.clone()).await.unwrap();
    assert_eq!(response.job.status, JobStatus::Completed);
    assert_eq!(response.job.tasks_analyzed, 3);
    assert_eq!(response.job.priorities_changed, 2);

    let history = service.history(1, None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|h| h.new_priority > Priority::Low));

    let reverted = service.revert(1, history[0].id).await.unwrap();
    assert!(reverted.reverted_at.is_some());

    let stats = service.stats(1).await.unwrap();
    assert_eq!(stats.total_optimizations, 2);
    assert_eq!(stats.reverted, 1);
    assert_eq!(stats.total_jobs, 1);
}

#[tokio::test]
async fn test_application_stops_on_shutdown_signal() {
    let app = std::sync::Arc::new(Application::with_database(
        test_config(),
        AppMode::Coordinator,
        seeded_database().await,
        None,
    ));
    let shutdown = ShutdownManager::new();

    let handle = {
        let app = app.clone();
        let rx = shutdown.subscribe();
        tokio::spawn(async move { app.run(rx).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    let finished = shutdown
        .shutdown_and_wait(handle, Duration::from_secs(5))
        .await;
    assert!(finished);
    assert!(shutdown.is_shutdown());
}

#[test]
fn test_load_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[worker]
worker_count = 3
max_changes_ceiling = 40

[scoring]
min_fired_rules = 1

[observability]
log_format = "json"
"#
    )
    .unwrap();

    let config = AppConfig::load(file.path().to_str()).unwrap();
    assert_eq!(config.worker.worker_count, 3);
    assert_eq!(config.worker.max_changes_ceiling, 40);
    assert_eq!(config.scoring.min_fired_rules, 1);
    assert_eq!(config.observability.log_format, "json");
    assert_eq!(config.coordinator.scan_interval_seconds, 30);
    assert!(AppMode::parse("coordinator", &config).is_ok());
}
