//! 配置管理
//!
//! 配置按以下顺序加载，后者覆盖前者：
//!
//! 1. 内置默认值
//! 2. TOML配置文件（默认查找 `config/optimizer.toml`）
//! 3. 环境变量（前缀 `OPTIMIZER_`，层级分隔符 `__`）
//!
//! ```rust,no_run
//! use optimizer_core::config::AppConfig;
//!
//! let config = AppConfig::load(Some("config/optimizer.toml")).unwrap();
//! println!("扫描间隔: {}s", config.coordinator.scan_interval_seconds);
//! ```

pub mod models;

pub use models::*;
