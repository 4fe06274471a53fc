use std::path::PathBuf;

use async_channel::{Receiver, Sender, TrySendError};

/// One "transcode this upload into every configured rendition" job. Lives
/// only in memory; a restart loses whatever is queued or in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeTask {
    pub upload_dir: PathBuf,
    pub video_id: i64,
    pub source_path: PathBuf,
    pub content_hash: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueError {
    Full(TranscodeTask),
    Closed(TranscodeTask),
}

impl EnqueueError {
    pub fn into_task(self) -> TranscodeTask {
        match self {
            EnqueueError::Full(task) | EnqueueError::Closed(task) => task,
        }
    }
}

/// Bounded FIFO between ingestion (producers) and the worker pool
/// (consumers). A full queue makes `enqueue` wait; that wait is the only
/// backpressure in the pipeline.
#[derive(Clone)]
pub struct TaskQueue {
    tx: Sender<TranscodeTask>,
    rx: Receiver<TranscodeTask>,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Waits for a free slot. Fails only once the queue is closed.
    pub async fn enqueue(&self, task: TranscodeTask) -> Result<(), EnqueueError> {
        self.tx
            .send(task)
            .await
            .map_err(|e| EnqueueError::Closed(e.into_inner()))
    }

    pub fn try_enqueue(&self, task: TranscodeTask) -> Result<(), EnqueueError> {
        self.tx.try_send(task).map_err(|e| match e {
            TrySendError::Full(task) => EnqueueError::Full(task),
            TrySendError::Closed(task) => EnqueueError::Closed(task),
        })
    }

    /// Next task, or `None` once the queue is closed and drained.
    pub async fn dequeue(&self) -> Option<TranscodeTask> {
        self.rx.recv().await.ok()
    }

    #[cfg(test)]
    pub fn try_dequeue(&self) -> Option<TranscodeTask> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }

    /// Refuses new tasks. Queued tasks can still be dequeued.
    pub fn close(&self) -> bool {
        self.tx.close()
    }
}

#[cfg(test)]
pub(crate) fn task(video_id: i64) -> TranscodeTask {
    TranscodeTask {
        upload_dir: PathBuf::from("/tmp/abc"),
        video_id,
        source_path: PathBuf::from("/tmp/abc/sample.mp4"),
        content_hash: "abc".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let queue = TaskQueue::new(3);
        for id in 1..=3 {
            queue.enqueue(task(id)).await.unwrap();
        }
        assert_eq!(queue.len(), 3);

        for id in 1..=3 {
            assert_eq!(queue.dequeue().await.unwrap().video_id, id);
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn full_queue_blocks_the_producer_until_a_slot_frees() {
        let queue = TaskQueue::new(2);
        queue.enqueue(task(1)).await.unwrap();
        queue.enqueue(task(2)).await.unwrap();
        assert!(matches!(queue.try_enqueue(task(99)), Err(EnqueueError::Full(_))));

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.enqueue(task(3)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished(), "third enqueue should be waiting");
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.dequeue().await.unwrap().video_id, 1);
        timeout(Duration::from_secs(1), producer)
            .await
            .expect("producer unblocked")
            .unwrap()
            .unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn closed_queue_refuses_new_work_but_drains() {
        let queue = TaskQueue::new(2);
        queue.enqueue(task(1)).await.unwrap();
        assert!(queue.close());

        let rejected = queue.enqueue(task(2)).await.unwrap_err();
        assert_eq!(rejected.into_task().video_id, 2);

        assert_eq!(queue.dequeue().await.unwrap().video_id, 1);
        assert!(queue.dequeue().await.is_none());
    }

    #[test]
    fn capacity_has_a_floor_of_one() {
        assert_eq!(TaskQueue::new(0).capacity(), 1);
        assert_eq!(TaskQueue::new(50).capacity(), 50);
    }
}
