//! MPMC FIFO queues with join-barrier bookkeeping.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// A FIFO work queue shared by the worker pool.
///
/// Alongside the items it tracks an outstanding-task count: [`put`]
/// raises it, [`task_done`] lowers it, and [`requeue`] leaves it alone
/// so a failed attempt keeps its task open. [`join`] resolves once every
/// task put on the queue has been marked done, regardless of how many
/// attempts each one took.
///
/// The mutex is synchronous and never held across an await.
///
/// [`put`]: TaskQueue::put
/// [`task_done`]: TaskQueue::task_done
/// [`requeue`]: TaskQueue::requeue
/// [`join`]: TaskQueue::join
#[derive(Debug)]
pub struct TaskQueue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Notify,
    outstanding: AtomicUsize,
    drained: Notify,
}

impl<T> TaskQueue<T> {
    pub fn new() -> TaskQueue<T> {
        TaskQueue {
            items: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
            outstanding: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Adds a new task and raises the outstanding count.
    pub fn put(&self, item: T) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.push(item);
    }

    /// Returns a task after a failed attempt. The outstanding count is
    /// untouched: the original `put` is still unaccounted for.
    pub fn requeue(&self, item: T) {
        self.push(item);
    }

    fn push(&self, item: T) {
        self.items.lock().unwrap().push_back(item);
        self.ready.notify_one();
    }

    /// Takes the next item, waiting for one if the queue is empty.
    pub async fn get(&self) -> T {
        loop {
            {
                let mut items = self.items.lock().unwrap();
                if let Some(item) = items.pop_front() {
                    if !items.is_empty() {
                        // pass the wakeup on: a single notify permit may
                        // have covered several pushes
                        self.ready.notify_one();
                    }
                    return item;
                }
            }
            self.ready.notified().await;
        }
    }

    /// Marks one task complete. The final call releases [`join`].
    ///
    /// [`join`]: TaskQueue::join
    pub fn task_done(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Whether every task ever put has been marked done.
    pub fn is_drained(&self) -> bool {
        self.outstanding.load(Ordering::SeqCst) == 0
    }

    /// Outstanding tasks: put but not yet marked done.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Waits until the outstanding count reaches zero.
    pub async fn join(&self) {
        loop {
            let drained = self.drained.notified();
            if self.is_drained() {
                return;
            }
            drained.await;
        }
    }

    /// Removes and returns everything currently queued. Meant for the
    /// single consumer left after the pool has shut down.
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().unwrap().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
