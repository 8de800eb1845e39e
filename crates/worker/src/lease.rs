//! 调度租约：保证同一调度同时最多只有一个运行中的作业

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ScheduleLeases {
    held: Arc<Mutex<HashSet<i64>>>,
}

impl ScheduleLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试获取调度租约，已被占用时返回 `None`
    pub fn try_acquire(&self, schedule_id: i64) -> Option<LeaseGuard> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(schedule_id) {
            return None;
        }
        debug!(schedule_id, "Schedule lease acquired");
        Some(LeaseGuard {
            schedule_id,
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_held(&self, schedule_id: i64) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&schedule_id)
    }
}

/// 租约守卫，离开作用域时释放租约
#[derive(Debug)]
pub struct LeaseGuard {
    schedule_id: i64,
    held: Arc<Mutex<HashSet<i64>>>,
}

impl LeaseGuard {
    pub fn schedule_id(&self) -> i64 {
        self.schedule_id
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.schedule_id);
        debug!(schedule_id = self.schedule_id, "Schedule lease released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_is_exclusive_until_dropped() {
        let leases = ScheduleLeases::new();

        let guard = leases.try_acquire(1).unwrap();
        assert_eq!(guard.schedule_id(), 1);
        assert!(leases.is_held(1));
        assert!(leases.try_acquire(1).is_none());
        assert!(leases.try_acquire(2).is_some());

        drop(guard);
        assert!(!leases.is_held(1));
        assert!(leases.try_acquire(1).is_some());
    }
}
