use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use optimizer_core::models::{OptimizationRule, RuleConfig};
use optimizer_core::traits::RuleRepository;
use optimizer_core::{OptimizerError, OptimizerResult};

use crate::database::mapping::MappingHelpers;

const RULE_COLUMNS: &str = "id, owner_id, name, description, rule_type, config, weight, \
     trigger_conditions, exclusion_conditions, applies_to, is_active, times_applied, \
     success_count, success_rate, created_at, updated_at";

pub struct SqliteRuleRepository {
    pool: SqlitePool,
}

impl SqliteRuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_rule(row: &SqliteRow) -> OptimizerResult<OptimizationRule> {
        let rule_type: String = row.try_get("rule_type")?;
        let config: serde_json::Value = MappingHelpers::parse_json(row, "config")?;

        Ok(OptimizationRule {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            config: RuleConfig::from_parts(&rule_type, config)?,
            weight: row.try_get("weight")?,
            trigger_conditions: MappingHelpers::parse_json(row, "trigger_conditions")?,
            exclusion_conditions: MappingHelpers::parse_json(row, "exclusion_conditions")?,
            applies_to: MappingHelpers::parse_json(row, "applies_to")?,
            is_active: row.try_get("is_active")?,
            times_applied: row.try_get("times_applied")?,
            success_count: row.try_get("success_count")?,
            success_rate: row.try_get("success_rate")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn fetch(&self, sql: &str, owner_id: i64) -> OptimizerResult<Vec<OptimizationRule>> {
        let rows = sqlx::query(sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_rule).collect()
    }
}

#[async_trait]
impl RuleRepository for SqliteRuleRepository {
    #[instrument(skip(self, rule), fields(owner_id = rule.owner_id, rule_name = %rule.name))]
    async fn create(&self, rule: &OptimizationRule) -> OptimizerResult<OptimizationRule> {
        let row = sqlx::query(&format!(
            "INSERT INTO optimization_rules (owner_id, name, description, rule_type, config, weight, \
             trigger_conditions, exclusion_conditions, applies_to, is_active, times_applied, \
             success_count, success_rate, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {RULE_COLUMNS}"
        ))
        .bind(rule.owner_id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.rule_type().as_str())
        .bind(MappingHelpers::to_json(&rule.config.config_value())?)
        .bind(rule.weight)
        .bind(MappingHelpers::to_json(&rule.trigger_conditions)?)
        .bind(MappingHelpers::to_json(&rule.exclusion_conditions)?)
        .bind(MappingHelpers::to_json(&rule.applies_to)?)
        .bind(rule.is_active)
        .bind(rule.times_applied)
        .bind(rule.success_count)
        .bind(rule.success_rate)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .fetch_one(&self.pool)
        .await?;

        let created = Self::row_to_rule(&row)?;
        debug!(rule_id = created.id, "Inserted optimization rule");
        Ok(created)
    }

    async fn get_by_id(&self, owner_id: i64, id: i64) -> OptimizerResult<Option<OptimizationRule>> {
        let row = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM optimization_rules WHERE id = ? AND owner_id = ?"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_rule).transpose()
    }

    async fn list(&self, owner_id: i64) -> OptimizerResult<Vec<OptimizationRule>> {
        self.fetch(
            &format!("SELECT {RULE_COLUMNS} FROM optimization_rules WHERE owner_id = ? ORDER BY id"),
            owner_id,
        )
        .await
    }

    async fn list_active(&self, owner_id: i64) -> OptimizerResult<Vec<OptimizationRule>> {
        self.fetch(
            &format!(
                "SELECT {RULE_COLUMNS} FROM optimization_rules \
                 WHERE owner_id = ? AND is_active = 1 ORDER BY id"
            ),
            owner_id,
        )
        .await
    }

    #[instrument(skip(self, rule), fields(rule_id = rule.id))]
    async fn update(&self, rule: &OptimizationRule) -> OptimizerResult<()> {
        let result = sqlx::query(
            "UPDATE optimization_rules SET name = ?, description = ?, rule_type = ?, config = ?, \
             weight = ?, trigger_conditions = ?, exclusion_conditions = ?, applies_to = ?, \
             is_active = ?, updated_at = ? WHERE id = ? AND owner_id = ?",
        )
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.rule_type().as_str())
        .bind(MappingHelpers::to_json(&rule.config.config_value())?)
        .bind(rule.weight)
        .bind(MappingHelpers::to_json(&rule.trigger_conditions)?)
        .bind(MappingHelpers::to_json(&rule.exclusion_conditions)?)
        .bind(MappingHelpers::to_json(&rule.applies_to)?)
        .bind(rule.is_active)
        .bind(rule.updated_at)
        .bind(rule.id)
        .bind(rule.owner_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OptimizerError::RuleNotFound { id: rule.id });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, owner_id: i64, id: i64) -> OptimizerResult<()> {
        let result = sqlx::query("DELETE FROM optimization_rules WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OptimizerError::RuleNotFound { id });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn record_outcome(&self, rule_id: i64, success: bool) -> OptimizerResult<bool> {
        // SET 右侧读取的是更新前的值
        let result = sqlx::query(
            "UPDATE optimization_rules SET \
             times_applied = times_applied + 1, \
             success_count = success_count + ?1, \
             success_rate = CAST(success_count + ?1 AS REAL) / (times_applied + 1), \
             updated_at = ?2 \
             WHERE id = ?3",
        )
        .bind(i64::from(success))
        .bind(Utc::now())
        .bind(rule_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
