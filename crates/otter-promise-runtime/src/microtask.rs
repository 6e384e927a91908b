//! Microtask queue for promise jobs.
//!
//! ## Ordering Guarantees
//!
//! - FIFO: First queued, first executed
//! - Jobs enqueued while a batch runs are picked up by the next batch, after
//!   everything that was queued before them
//! - Nothing runs at enqueue time; jobs only run when the queue is drained

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use otter_promise::{Job, JobQueue};

/// Queue of promise jobs
pub struct MicrotaskQueue {
    queue: Mutex<VecDeque<Job>>,
    len: AtomicUsize,
}

impl MicrotaskQueue {
    /// Create new empty queue
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
        }
    }

    /// Add a job to the back of the queue
    pub fn push(&self, job: Job) {
        self.queue.lock().push_back(job);
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the next job
    pub fn dequeue(&self) -> Option<Job> {
        let job = self.queue.lock().pop_front();
        if job.is_some() {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        job
    }

    /// Move up to `max` queued jobs into `out` in FIFO order, in a single lock
    /// acquisition.
    pub fn dequeue_batch(&self, max: usize, out: &mut Vec<Job>) -> usize {
        if max == 0 {
            return 0;
        }
        let mut queue = self.queue.lock();
        let to_take = max.min(queue.len());
        out.reserve(to_take);
        out.extend(queue.drain(..to_take));
        if to_take != 0 {
            self.len.fetch_sub(to_take, Ordering::Relaxed);
        }
        to_take
    }

    /// Drain all currently queued jobs in FIFO order.
    pub fn drain_all(&self, out: &mut Vec<Job>) -> usize {
        self.dequeue_batch(usize::MAX, out)
    }

    /// Number of queued jobs
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all pending jobs
    pub fn clear(&self) {
        let mut queue = self.queue.lock();
        let len = queue.len();
        queue.clear();
        self.len.fetch_sub(len, Ordering::Relaxed);
    }
}

impl Default for MicrotaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue for MicrotaskQueue {
    fn enqueue(&self, job: Job) {
        self.push(job);
    }
}

impl std::fmt::Debug for MicrotaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicrotaskQueue")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use otter_promise::{Engine, Function, Value};

    fn marker(log: &Arc<Mutex<Vec<usize>>>, n: usize) -> Job {
        let log = Arc::clone(log);
        Box::new(move |_: &mut Engine| log.lock().push(n))
    }

    #[test]
    fn test_fifo_order() {
        let queue = Arc::new(MicrotaskQueue::new());
        let mut engine = Engine::new(queue.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            queue.push(marker(&log, n));
        }
        assert_eq!(queue.len(), 3);

        while let Some(job) = queue.dequeue() {
            job(&mut engine);
        }
        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_dequeue_batch_respects_max() {
        let queue = MicrotaskQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for n in 0..5 {
            queue.push(marker(&log, n));
        }

        let mut out = Vec::new();
        assert_eq!(queue.dequeue_batch(2, &mut out), 2);
        assert_eq!(out.len(), 2);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue_batch(0, &mut out), 0);
        assert_eq!(queue.drain_all(&mut out), 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear() {
        let queue = MicrotaskQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        queue.push(marker(&log, 0));
        queue.push(marker(&log, 1));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.dequeue().is_none());
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_engine_submits_through_queue() {
        let queue = Arc::new(MicrotaskQueue::new());
        let mut engine = Engine::new(queue.clone());
        let p = engine.resolve(Value::number(1.0));
        engine.then(p, Some(Function::unary(|_, v| Ok(v))), None);
        assert_eq!(queue.len(), 1);
    }
}
