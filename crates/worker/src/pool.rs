//! 作业工作池
//!
//! 固定数量的工作者从有界队列中取出作业交给 [`JobProcessor`] 执行。
//! 队列已满时作业立即以失败状态结束，不会阻塞调度扫描。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use optimizer_core::models::OptimizationJob;
use optimizer_core::{OptimizerError, OptimizerResult};
use optimizer_infrastructure::MetricsCollector;

use crate::cancellation::{CancellationFlag, CancellationRegistry};
use crate::processor::JobProcessor;

struct QueuedJob {
    job: OptimizationJob,
    cancel: CancellationFlag,
}

pub struct WorkerPool {
    sender: mpsc::Sender<QueuedJob>,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedJob>>>,
    processor: Arc<JobProcessor>,
    registry: CancellationRegistry,
    metrics: Arc<MetricsCollector>,
    queued: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// 启动工作者并返回工作池
    pub fn start(
        processor: Arc<JobProcessor>,
        worker_count: usize,
        queue_capacity: usize,
        metrics: Arc<MetricsCollector>,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let (shutdown_tx, _) = broadcast::channel(1);

        let pool = Arc::new(Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            processor,
            registry: CancellationRegistry::new(),
            metrics,
            queued: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        });

        let handles: Vec<JoinHandle<()>> = (0..worker_count.max(1))
            .map(|worker_index| {
                let worker = pool.clone();
                let shutdown_rx = pool.shutdown_tx.subscribe();
                tokio::spawn(async move { worker.worker_loop(worker_index, shutdown_rx).await })
            })
            .collect();

        // 刚创建的锁不存在竞争
        if let Ok(mut guard) = pool.handles.try_lock() {
            *guard = handles;
        }

        info!(worker_count, queue_capacity, "Worker pool started");
        pool
    }

    /// 提交作业，队列已满时作业被标记为失败
    pub async fn submit(&self, job: OptimizationJob) -> OptimizerResult<()> {
        let job_id = job.id;
        let cancel = self.registry.register(job_id).await;

        match self.sender.try_send(QueuedJob { job, cancel }) {
            Ok(()) => {
                let depth = self.queued.fetch_add(1, Ordering::SeqCst) + 1;
                self.metrics.update_queue_depth(depth as f64);
                debug!(job_id, queue_depth = depth, "Optimization job queued");
                Ok(())
            }
            Err(TrySendError::Full(QueuedJob { mut job, .. })) => {
                self.registry.unregister(job_id).await;
                warn!(job_id, "Job queue is full, rejecting job");
                self.processor
                    .fail_job(&mut job, "queue_full", "job queue is full")
                    .await?;
                Err(OptimizerError::Internal("作业队列已满".to_string()))
            }
            Err(TrySendError::Closed(QueuedJob { mut job, .. })) => {
                self.registry.unregister(job_id).await;
                warn!(job_id, "Worker pool is closed, rejecting job");
                self.processor
                    .fail_job(&mut job, "pool_closed", "worker pool is closed")
                    .await?;
                Err(OptimizerError::Internal("工作池已关闭".to_string()))
            }
        }
    }

    /// 将未能提交的作业标记为失败，避免它一直占用调度
    pub async fn reject(&self, job: &mut OptimizationJob, error_type: &str, message: &str) {
        if let Err(e) = self.processor.fail_job(job, error_type, message).await {
            error!(job_id = job.id, error = %e, "Failed to mark rejected job as failed");
        }
    }

    /// 请求取消排队中或运行中的作业
    pub async fn cancel(&self, job_id: i64) -> bool {
        self.registry.cancel(job_id).await
    }

    /// 取消标记登记表，停用调度时用来取消其运行中的作业
    pub fn registry(&self) -> CancellationRegistry {
        self.registry.clone()
    }

    pub fn queue_depth(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub async fn running_count(&self) -> usize {
        self.registry.running_count().await
    }

    /// 停止所有工作者；运行中的作业在下一个任务边界结束，排队中的作业标记为失败
    pub async fn shutdown(&self) {
        let cancelled = self.registry.cancel_all().await;
        let _ = self.shutdown_tx.send(());

        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked during shutdown");
            }
        }

        let mut receiver = self.receiver.lock().await;
        receiver.close();
        let mut drained = 0usize;
        while let Ok(QueuedJob { mut job, .. }) = receiver.try_recv() {
            drained += 1;
            if let Err(e) = self
                .processor
                .fail_job(&mut job, "cancelled", "cancelled")
                .await
            {
                warn!(job_id = job.id, error = %e, "Failed to mark queued job as cancelled");
            }
            self.registry.unregister(job.id).await;
        }
        self.queued.store(0, Ordering::SeqCst);
        self.metrics.update_queue_depth(0.0);

        info!(cancelled, drained, "Worker pool stopped");
    }

    async fn worker_loop(&self, worker_index: usize, mut shutdown_rx: broadcast::Receiver<()>) {
        debug!(worker_index, "Worker started");
        loop {
            let next = tokio::select! {
                _ = shutdown_rx.recv() => break,
                next = async { self.receiver.lock().await.recv().await } => next,
            };
            let Some(QueuedJob { job, cancel }) = next else {
                break;
            };

            let depth = self.queued.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
            self.metrics.update_queue_depth(depth as f64);

            let job_id = job.id;
            match self.processor.run_job(job, cancel).await {
                Ok(result) => debug!(
                    worker_index,
                    job_id,
                    status = %result.job.status,
                    "Worker finished job"
                ),
                Err(e) => warn!(worker_index, job_id, error = %e, "Worker job ended with error"),
            }
            self.registry.unregister(job_id).await;
        }
        debug!(worker_index, "Worker stopped");
    }
}
