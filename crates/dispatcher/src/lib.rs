//! # optimizer-dispatcher
//!
//! 调度端和应用层入口：
//!
//! - [`schedule_manager`] 调度的管理、校验和下次执行时间计算
//! - [`coordinator`] 周期扫描到期调度并提交作业
//! - [`cron_utils`] daily 调度的CRON计算
//! - [`service`] 供HTTP层和进程入口使用的 `OptimizationService`

pub mod coordinator;
pub mod cron_utils;
pub mod schedule_manager;
pub mod service;

pub use coordinator::{job_parameters, Coordinator, ScanReport};
pub use cron_utils::CronScheduler;
pub use schedule_manager::{parse_time_of_day, ScheduleDraft, ScheduleManager};
pub use service::{
    OptimizationService, OptimizeRequest, OptimizeResponse, RecommendationBatch, TaskError,
};
