//! SQLite表结构迁移，所有语句均可重复执行

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

const TABLES: &[(&str, &str)] = &[
    (
        "optimization_rules",
        r#"
        CREATE TABLE IF NOT EXISTS optimization_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            rule_type TEXT NOT NULL,
            config TEXT NOT NULL DEFAULT '{}',
            weight REAL NOT NULL,
            trigger_conditions TEXT NOT NULL DEFAULT '[]',
            exclusion_conditions TEXT NOT NULL DEFAULT '[]',
            applies_to TEXT NOT NULL DEFAULT '{}',
            is_active INTEGER NOT NULL DEFAULT 1,
            times_applied INTEGER NOT NULL DEFAULT 0,
            success_count INTEGER NOT NULL DEFAULT 0,
            success_rate REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "task_priority_scores",
        r#"
        CREATE TABLE IF NOT EXISTS task_priority_scores (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL,
            owner_id INTEGER NOT NULL,
            job_id INTEGER,
            calculated_priority TEXT NOT NULL,
            priority_score REAL NOT NULL,
            confidence_level REAL NOT NULL,
            urgency_score REAL NOT NULL,
            importance_score REAL NOT NULL,
            context_score REAL NOT NULL,
            pattern_score REAL NOT NULL,
            dependency_score REAL NOT NULL,
            is_current INTEGER NOT NULL DEFAULT 1,
            calculated_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "optimization_history",
        r#"
        CREATE TABLE IF NOT EXISTS optimization_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            task_id INTEGER NOT NULL,
            job_id INTEGER,
            old_priority TEXT NOT NULL,
            new_priority TEXT NOT NULL,
            priority_score REAL NOT NULL,
            confidence_level REAL NOT NULL,
            reasoning TEXT NOT NULL,
            applied_rules TEXT NOT NULL DEFAULT '[]',
            user_accepted INTEGER,
            user_feedback TEXT,
            feedback_at TEXT,
            reverted_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "optimization_schedules",
        r#"
        CREATE TABLE IF NOT EXISTS optimization_schedules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            schedule_type TEXT NOT NULL,
            time_of_day TEXT,
            scope TEXT NOT NULL DEFAULT 'all',
            filters TEXT NOT NULL DEFAULT '{}',
            max_changes_per_run INTEGER NOT NULL,
            min_confidence_threshold REAL NOT NULL,
            aggressiveness TEXT NOT NULL DEFAULT 'balanced',
            is_active INTEGER NOT NULL DEFAULT 1,
            last_run_at TEXT,
            next_run_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "optimization_jobs",
        r#"
        CREATE TABLE IF NOT EXISTS optimization_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            schedule_id INTEGER,
            trigger_type TEXT NOT NULL,
            parameters TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            tasks_analyzed INTEGER NOT NULL DEFAULT 0,
            priorities_changed INTEGER NOT NULL DEFAULT 0,
            errors_count INTEGER NOT NULL DEFAULT 0,
            error_details TEXT NOT NULL DEFAULT '[]',
            progress_percentage REAL NOT NULL DEFAULT 0,
            current_task_id INTEGER,
            retry_of INTEGER,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT
        )
        "#,
    ),
    (
        "tasks",
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            priority TEXT NOT NULL DEFAULT 'medium',
            status TEXT NOT NULL DEFAULT 'pending',
            due_date TEXT,
            category TEXT,
            project_id INTEGER,
            updated_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "task_dependencies",
        r#"
        CREATE TABLE IF NOT EXISTS task_dependencies (
            task_id INTEGER NOT NULL,
            blocked_task_id INTEGER NOT NULL,
            PRIMARY KEY (task_id, blocked_task_id),
            FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE,
            FOREIGN KEY (blocked_task_id) REFERENCES tasks(id) ON DELETE CASCADE
        )
        "#,
    ),
    (
        "task_signals",
        r#"
        CREATE TABLE IF NOT EXISTS task_signals (
            owner_id INTEGER NOT NULL,
            task_id INTEGER NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('pattern', 'context')),
            signal_key TEXT NOT NULL,
            value REAL NOT NULL,
            sample_size INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (owner_id, task_id, kind, signal_key)
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_rules_owner ON optimization_rules(owner_id, is_active)",
    // 每个 (owner, task) 最多一行当前评分
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_scores_current ON task_priority_scores(owner_id, task_id) WHERE is_current = 1",
    "CREATE INDEX IF NOT EXISTS idx_scores_task ON task_priority_scores(owner_id, task_id)",
    "CREATE INDEX IF NOT EXISTS idx_history_owner ON optimization_history(owner_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_history_job ON optimization_history(job_id)",
    "CREATE INDEX IF NOT EXISTS idx_schedules_due ON optimization_schedules(is_active, next_run_at)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_owner ON optimization_jobs(owner_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_schedule ON optimization_jobs(schedule_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_owner ON tasks(owner_id, status)",
];

/// 执行数据库迁移
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    debug!("Running SQLite database migrations");

    for (table, ddl) in TABLES {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .with_context(|| format!("创建表 {table} 失败"))?;
    }

    for index_sql in INDEXES {
        sqlx::query(index_sql)
            .execute(pool)
            .await
            .with_context(|| format!("创建索引失败: {index_sql}"))?;
    }

    debug!("Successfully completed SQLite database migrations");
    Ok(())
}
