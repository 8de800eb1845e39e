pub mod manager;
pub mod mapping;
pub mod migrations;
pub mod sqlite;

pub use manager::{DatabaseManager, DbPool, Repositories};
pub use migrations::run_migrations;
pub use sqlite::{
    SqliteHistoryRepository, SqliteJobRepository, SqliteRuleRepository, SqliteScheduleRepository,
    SignalKind, SqliteScoreRepository, SqliteSignalAggregator, SqliteTaskStore,
};
