//! # optimizer-worker
//!
//! 优化作业的执行端：
//!
//! - [`processor`] 单个作业的完整执行流程
//! - [`pool`] 有界队列和固定数量的工作者
//! - [`lease`] 每个调度同时只允许一个活跃作业
//! - [`cancellation`] 作业取消标记

pub mod cancellation;
pub mod lease;
pub mod pool;
pub mod processor;

pub use cancellation::{CancellationFlag, CancellationRegistry};
pub use lease::{LeaseGuard, ScheduleLeases};
pub use pool::WorkerPool;
pub use processor::{fetch_all_pages, sort_candidates, JobProcessor, JobResult, ProcessorSettings};
