//! # Optimizer Infrastructure
//!
//! 基础设施层：SQLite持久化、外部协作方适配器和可观测性。
//!
//! - `database` - 连接池管理、迁移和各仓储接口的SQLite实现
//! - `activity_log` - 基于tracing的活动日志
//! - `observability` - 指标收集和结构化日志

pub mod activity_log;
pub mod database;
pub mod observability;

pub use activity_log::TracingActivityLog;
pub use database::*;
pub use observability::*;
