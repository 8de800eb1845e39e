//! # optimizer-core
//!
//! 优先级优化引擎的共享基础：错误类型、数据模型、仓储与协作方接口、配置。

pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use errors::*;
