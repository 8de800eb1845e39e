use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use optimizer_core::models::{SignalMap, TaskSignals};
use optimizer_core::traits::SignalAggregator;
use optimizer_core::{OptimizerError, OptimizerResult};

/// 信号种类，对应 `task_signals.kind` 列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Pattern,
    Context,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Pattern => "pattern",
            SignalKind::Context => "context",
        }
    }
}

/// 读取预聚合信号表的信号聚合器
pub struct SqliteSignalAggregator {
    pool: SqlitePool,
}

impl SqliteSignalAggregator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 写入或覆盖一条预聚合信号
    pub async fn upsert_signal(
        &self,
        owner_id: i64,
        task_id: i64,
        kind: SignalKind,
        key: &str,
        value: f64,
        sample_size: u32,
    ) -> OptimizerResult<()> {
        sqlx::query(
            "INSERT INTO task_signals (owner_id, task_id, kind, signal_key, value, sample_size) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(owner_id, task_id, kind, signal_key) \
             DO UPDATE SET value = excluded.value, sample_size = excluded.sample_size",
        )
        .bind(owner_id)
        .bind(task_id)
        .bind(kind.as_str())
        .bind(key)
        .bind(value)
        .bind(i64::from(sample_size))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SignalAggregator for SqliteSignalAggregator {
    async fn signals_for(&self, owner_id: i64, task_id: i64) -> OptimizerResult<TaskSignals> {
        let rows = sqlx::query(
            "SELECT kind, signal_key, value, sample_size FROM task_signals \
             WHERE owner_id = ? AND task_id = ?",
        )
        .bind(owner_id)
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        let mut signals = TaskSignals::default();
        for row in rows {
            let kind: String = row.try_get("kind")?;
            let map: &mut SignalMap = match kind.as_str() {
                "pattern" => &mut signals.pattern,
                "context" => &mut signals.context,
                other => {
                    return Err(OptimizerError::Serialization(format!("未知的信号种类: {other}")))
                }
            };
            let sample_size: i64 = row.try_get("sample_size")?;
            // 同一种类取最大样本数
            map.sample_size = map
                .sample_size
                .max(u32::try_from(sample_size).unwrap_or(u32::MAX));
            map.values
                .insert(row.try_get("signal_key")?, row.try_get("value")?);
        }
        Ok(signals)
    }
}
