//! Bounded worker pool over a crossbeam channel.

use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender, TrySendError};
use tracing::debug;

use engram_core::errors::{EngramResult, JobError};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Fixed worker threads pulling tasks from a bounded queue.
///
/// Dropping the pool closes the queue and joins the workers; queued
/// tasks still run to completion first.
pub struct WorkerPool {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl WorkerPool {
    pub fn new(worker_count: usize, queue_capacity: usize) -> EngramResult<Self> {
        let (sender, receiver) = bounded::<Task>(queue_capacity);
        let mut workers = Vec::with_capacity(worker_count.max(1));
        for i in 0..worker_count.max(1) {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("engram-worker-{i}"))
                .spawn(move || {
                    while let Ok(task) = receiver.recv() {
                        task();
                    }
                    debug!(worker = i, "worker pool thread exiting");
                })?;
            workers.push(handle);
        }
        Ok(Self {
            sender: Some(sender),
            workers,
            queue_capacity,
        })
    }

    /// Enqueue a task; a full queue is backpressure, not a panic.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> EngramResult<()> {
        let sender = self.sender.as_ref().ok_or(JobError::PoolSaturated {
            queued: self.queue_capacity,
            max: self.queue_capacity,
        })?;
        match sender.try_send(Box::new(task)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                Err(JobError::PoolSaturated {
                    queued: self.queue_capacity,
                    max: self.queue_capacity,
                }
                .into())
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn tasks_run_on_workers() {
        let pool = WorkerPool::new(2, 16).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        drop(pool); // joins workers
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn full_queue_is_saturation() {
        let pool = WorkerPool::new(1, 1).unwrap();
        let gate = Arc::new(std::sync::Barrier::new(2));
        let g = Arc::clone(&gate);
        // Occupy the single worker.
        pool.submit(move || {
            g.wait();
        })
        .unwrap();
        // Fill the queue, then overflow it.
        let mut saturated = false;
        for _ in 0..4 {
            if pool.submit(|| {}).is_err() {
                saturated = true;
                break;
            }
        }
        gate.wait();
        assert!(saturated);
    }
}
