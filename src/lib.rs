//! 智能任务优先级优化引擎的进程入口：运行模式、组件组装和优雅关闭。

pub mod app;
pub mod shutdown;

pub use app::{AppMode, Application};
pub use shutdown::{wait_for_shutdown_signal, ShutdownManager, DEFAULT_SHUTDOWN_TIMEOUT};
