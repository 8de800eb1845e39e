//! 数据库行映射的公共工具
//!
//! SQLite没有原生JSON和无符号整数类型，这里统一处理JSON文本列和计数列。

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use optimizer_core::{OptimizerError, OptimizerResult};

pub struct MappingHelpers;

impl MappingHelpers {
    /// 解析JSON文本列
    pub fn parse_json<T: DeserializeOwned>(row: &SqliteRow, field_name: &str) -> OptimizerResult<T> {
        let json_str: String = row.try_get(field_name)?;
        serde_json::from_str(&json_str).map_err(|e| {
            OptimizerError::Serialization(format!("解析字段 {field_name} 失败: {e}"))
        })
    }

    pub fn to_json<T: Serialize>(value: &T) -> OptimizerResult<String> {
        Ok(serde_json::to_string(value)?)
    }

    /// 读取以INTEGER存储的计数列
    pub fn get_u32(row: &SqliteRow, field_name: &str) -> OptimizerResult<u32> {
        let value: i64 = row.try_get(field_name)?;
        u32::try_from(value).map_err(|_| {
            OptimizerError::Serialization(format!("字段 {field_name} 超出范围: {value}"))
        })
    }
}
