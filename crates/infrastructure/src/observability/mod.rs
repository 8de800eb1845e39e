//! 可观测性
//!
//! - 指标收集（`metrics` + Prometheus导出）
//! - 结构化事件日志
//! - 日志和指标的初始化

pub mod metrics_collector;
pub mod structured_logger;
pub mod telemetry_setup;

pub use metrics_collector::MetricsCollector;
pub use structured_logger::StructuredLogger;
pub use telemetry_setup::{init_logging, init_metrics};
