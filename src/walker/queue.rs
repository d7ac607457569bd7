//! Shared work queue with worker-count-aware termination
//!
//! Every worker of a server pops query nodes from one FIFO queue and pushes
//! the children it forks back onto it. The queue alone cannot tell when the
//! walk is over: an empty queue only means "nothing right now", another
//! worker may be about to push children.
//!
//! Termination is therefore declared inside [`WorkQueue::pop`], under the
//! queue lock: when a worker finds the queue empty and every other worker is
//! already parked waiting, no one can produce more work. That worker sets
//! the shutdown flag and wakes all parked siblings, which then leave too.

use crate::query::NodeId;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// What a worker got from [`WorkQueue::pop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueItem {
    /// A node to process
    Query(NodeId),

    /// This worker detected that the work is exhausted
    Exhausted,

    /// Another worker declared termination (or the pool was shut down)
    Shutdown,
}

/// Statistics for the work queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total nodes enqueued
    pub enqueued: AtomicU64,

    /// Total nodes dequeued
    pub dequeued: AtomicU64,

    /// Number of times a worker parked on an empty queue
    pub waits: AtomicU64,
}

impl QueueStats {
    /// Get queue throughput (dequeued nodes)
    pub fn throughput(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }

    pub fn wait_count(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<NodeId>,
    /// Workers currently parked in `pop`
    idle: usize,
    shutdown: bool,
}

/// FIFO queue of query nodes shared by the workers of one server
#[derive(Debug)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    worker_count: usize,
    stats: QueueStats,
}

impl WorkQueue {
    /// Create a queue for `worker_count` workers (at least one)
    pub fn new(worker_count: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            worker_count: worker_count.max(1),
            stats: QueueStats::default(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Enqueue the root nodes of a submission
    pub fn seed<I>(&self, ids: I)
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mut state = self.state.lock();
        let before = state.items.len();
        state.items.extend(ids);
        let added = state.items.len() - before;
        drop(state);

        self.stats.enqueued.fetch_add(added as u64, Ordering::Relaxed);
        self.available.notify_all();
    }

    /// Enqueue one node and wake one parked worker
    pub fn push(&self, id: NodeId) {
        self.state.lock().items.push_back(id);
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        self.available.notify_one();
    }

    /// Take the next node, blocking while other workers may still produce work
    pub fn pop(&self) -> QueueItem {
        let mut state = self.state.lock();

        loop {
            if let Some(id) = state.items.pop_front() {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                return QueueItem::Query(id);
            }

            if state.shutdown {
                return QueueItem::Shutdown;
            }

            // everyone else is parked and the queue is empty
            if state.idle + 1 >= self.worker_count {
                state.shutdown = true;
                drop(state);
                self.available.notify_all();
                return QueueItem::Exhausted;
            }

            state.idle += 1;
            self.stats.waits.fetch_add(1, Ordering::Relaxed);
            self.available.wait(&mut state);
            state.idle -= 1;
        }
    }

    /// Wake every parked worker and make further pops return `Shutdown`
    ///
    /// Used when the pool cannot start all of its workers.
    pub fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.available.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_single_worker_drains_then_exhausts() {
        let queue = WorkQueue::new(1);
        queue.seed([NodeId(0), NodeId(1)]);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop(), QueueItem::Query(NodeId(0)));
        queue.push(NodeId(2));
        assert_eq!(queue.pop(), QueueItem::Query(NodeId(1)));
        assert_eq!(queue.pop(), QueueItem::Query(NodeId(2)));
        assert_eq!(queue.pop(), QueueItem::Exhausted);
        assert_eq!(queue.pop(), QueueItem::Shutdown);
        assert_eq!(queue.stats().throughput(), 3);
    }

    #[test]
    fn test_zero_workers_is_clamped() {
        let queue = WorkQueue::new(0);
        assert_eq!(queue.worker_count(), 1);
        assert_eq!(queue.pop(), QueueItem::Exhausted);
    }

    #[test]
    fn test_shutdown_wakes_parked_workers() {
        let queue = Arc::new(WorkQueue::new(3));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.pop())
            })
            .collect();

        while queue.stats().wait_count() < 2 {
            thread::sleep(Duration::from_millis(5));
        }
        queue.shutdown();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), QueueItem::Shutdown);
        }
        assert!(queue.is_shutdown());
    }

    /// A binary tree of 31 nodes discovered while walking: node n forks
    /// 2n+1 and 2n+2. All workers must exit and each node is seen once.
    #[test]
    fn test_dynamic_work_terminates() {
        const WORKERS: usize = 4;
        const NODES: usize = 31;
        let queue = Arc::new(WorkQueue::new(WORKERS));
        let processed = Arc::new(Mutex::new(Vec::new()));
        queue.seed([NodeId(0)]);

        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let processed = Arc::clone(&processed);
                thread::spawn(move || loop {
                    match queue.pop() {
                        QueueItem::Query(id) => {
                            processed.lock().push(id.index());
                            thread::sleep(Duration::from_millis(1));
                            for child in [2 * id.index() + 1, 2 * id.index() + 2] {
                                if child < NODES {
                                    queue.push(NodeId(child));
                                }
                            }
                        }
                        QueueItem::Exhausted => return 1,
                        QueueItem::Shutdown => return 0,
                    }
                })
            })
            .collect();

        let exhausted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(exhausted, 1);

        let mut ids = processed.lock().clone();
        ids.sort_unstable();
        assert_eq!(ids, (0..NODES).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }
}
