use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::VideoError;
use crate::workers::queue::{TaskQueue, TranscodeTask};

#[async_trait]
pub trait TaskRunner: Send + Sync + 'static {
    async fn run(&self, task: TranscodeTask) -> Result<(), VideoError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub completed: u64,
    pub failed: u64,
    pub panicked: u64,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PoolStats {
        PoolStats {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// Fixed set of workers draining one `TaskQueue`. A worker takes one task,
/// runs it to completion and takes the next; a failing or panicking task
/// never takes its worker down.
pub struct WorkerPool {
    queue: TaskQueue,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    pub fn start(size: usize, queue: TaskQueue, runner: Arc<dyn TaskRunner>) -> Self {
        let size = size.max(1);
        let counters = Arc::new(Counters::default());

        let workers = (0..size)
            .map(|worker_id| {
                tokio::spawn(work(worker_id, queue.clone(), runner.clone(), counters.clone()))
            })
            .collect();

        info!(op = "WorkerPool::start", size, capacity = queue.capacity(), "transcode workers started");
        Self {
            queue,
            workers,
            counters,
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Closes the queue, lets the workers finish everything already queued
    /// and waits for them.
    pub async fn shutdown(self) -> PoolStats {
        self.queue.close();
        if !self.queue.is_empty() {
            info!(op = "WorkerPool::shutdown", pending = self.queue.len(), "finishing queued transcode tasks");
        }
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(op = "WorkerPool::shutdown", error = %e, "worker ended abnormally");
            }
        }

        let stats = self.counters.snapshot();
        info!(op = "WorkerPool::shutdown", ?stats, "transcode workers stopped");
        stats
    }
}

async fn work(worker_id: usize, queue: TaskQueue, runner: Arc<dyn TaskRunner>, counters: Arc<Counters>) {
    while let Some(task) = queue.dequeue().await {
        let video_id = task.video_id;
        let runner = runner.clone();

        // Own task so a panic surfaces as a JoinError instead of killing the loop.
        match tokio::spawn(async move { runner.run(task).await }).await {
            Ok(Ok(())) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(op = e.op(), worker_id, video_id, error = %e, "transcode task failed");
            }
            Err(e) => {
                counters.panicked.fetch_add(1, Ordering::Relaxed);
                error!(op = "WorkerPool::work", worker_id, video_id, error = %e, "transcode task panicked");
            }
        }
    }
    info!(op = "WorkerPool::work", worker_id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::queue::task;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Fails task 1, panics on task 2, succeeds otherwise.
    #[derive(Default)]
    struct Flaky {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl TaskRunner for Flaky {
        async fn run(&self, task: TranscodeTask) -> Result<(), VideoError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(task.video_id);
            }
            match task.video_id {
                1 => Err(VideoError::ingestion("test", "boom")),
                2 => panic!("encoder exploded"),
                _ => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn a_single_worker_survives_failures_and_panics() {
        let queue = TaskQueue::new(8);
        let runner = Arc::new(Flaky::default());
        let pool = WorkerPool::start(1, queue.clone(), runner.clone());

        for id in 1..=4 {
            queue.enqueue(task(id)).await.unwrap();
        }
        let stats = timeout(Duration::from_secs(5), pool.shutdown()).await.unwrap();

        assert_eq!(
            stats,
            PoolStats {
                completed: 2,
                failed: 1,
                panicked: 1
            }
        );
        assert_eq!(*runner.seen.lock().unwrap(), [1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn shutdown_drains_queued_tasks_and_refuses_new_ones() {
        let queue = TaskQueue::new(8);
        let runner = Arc::new(Flaky::default());
        let pool = WorkerPool::start(3, queue.clone(), runner.clone());
        assert_eq!(pool.size(), 3);

        for id in 10..15 {
            queue.enqueue(task(id)).await.unwrap();
        }
        let stats = pool.shutdown().await;

        assert_eq!(stats.completed, 5);
        assert!(queue.enqueue(task(99)).await.is_err());
    }
}
