pub mod sqlite_history_repository;
pub mod sqlite_job_repository;
pub mod sqlite_rule_repository;
pub mod sqlite_schedule_repository;
pub mod sqlite_score_repository;
pub mod sqlite_signal_aggregator;
pub mod sqlite_task_store;

pub use sqlite_history_repository::SqliteHistoryRepository;
pub use sqlite_job_repository::SqliteJobRepository;
pub use sqlite_rule_repository::SqliteRuleRepository;
pub use sqlite_schedule_repository::SqliteScheduleRepository;
pub use sqlite_score_repository::SqliteScoreRepository;
pub use sqlite_signal_aggregator::{SignalKind, SqliteSignalAggregator};
pub use sqlite_task_store::SqliteTaskStore;
