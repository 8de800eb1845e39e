//! 作业取消标记
//!
//! 作业处理器在任务之间检查标记；停用调度、取消作业或进程关闭时设置标记。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 按作业ID登记的取消标记
#[derive(Debug, Clone, Default)]
pub struct CancellationRegistry {
    flags: Arc<RwLock<HashMap<i64, CancellationFlag>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记作业并返回其取消标记，重复登记返回同一标记
    pub async fn register(&self, job_id: i64) -> CancellationFlag {
        let mut flags = self.flags.write().await;
        flags.entry(job_id).or_default().clone()
    }

    pub async fn unregister(&self, job_id: i64) {
        self.flags.write().await.remove(&job_id);
    }

    /// 取消已登记的作业，作业未登记时返回 false
    pub async fn cancel(&self, job_id: i64) -> bool {
        match self.flags.read().await.get(&job_id) {
            Some(flag) => {
                flag.cancel();
                info!(job_id, "Optimization job cancellation requested");
                true
            }
            None => false,
        }
    }

    pub async fn cancel_all(&self) -> usize {
        let flags = self.flags.read().await;
        for flag in flags.values() {
            flag.cancel();
        }
        flags.len()
    }

    pub async fn running_count(&self) -> usize {
        self.flags.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_registered_job() {
        let registry = CancellationRegistry::new();
        let flag = registry.register(7).await;
        assert!(!flag.is_cancelled());

        assert!(registry.cancel(7).await);
        assert!(flag.is_cancelled());
        assert!(!registry.cancel(8).await);

        registry.unregister(7).await;
        assert_eq!(registry.running_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let registry = CancellationRegistry::new();
        let a = registry.register(1).await;
        let b = registry.register(2).await;

        assert_eq!(registry.cancel_all().await, 2);
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }
}
