// src/engine/queue.rs
//
// Thread-safe FIFO handing tasks from the scheduler to the worker pool.
//
// A single parking_lot mutex guards both the items and the closed flag, so the
// reported length can never disagree with what a dequeue would observe. Idle
// workers park on the condvar instead of polling the length.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Result of a blocking dequeue.
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeue<T> {
    Item(T),
    /// The wait timed out with the queue still empty and open.
    TimedOut,
    /// The queue is closed and fully drained.
    Closed,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Unbounded FIFO with condvar wakeups and close/drain semantics.
///
/// There is no producer backpressure: pass submission is paced by the pass
/// barrier, so the queue never holds more than one pass worth of tasks per epoch.
#[derive(Debug)]
pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    cvar: Condvar,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            cvar: Condvar::new(),
        }
    }

    /// Append to the tail. A closed queue hands the item back.
    pub fn enqueue(&self, item: T) -> Result<(), T> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(item);
        }
        state.items.push_back(item);
        self.cvar.notify_one();
        Ok(())
    }

    /// Append a whole batch at once and wake every idle worker.
    ///
    /// The closed flag is checked under the same lock that appends, so a batch
    /// is either fully visible to the workers or handed back whole.
    pub fn enqueue_batch<I>(&self, items: I) -> Result<usize, Vec<T>>
    where
        I: IntoIterator<Item = T>,
    {
        let mut state = self.state.lock();
        if state.closed {
            return Err(items.into_iter().collect());
        }
        let before = state.items.len();
        state.items.extend(items);
        let added = state.items.len() - before;
        if added > 0 {
            self.cvar.notify_all();
        }
        Ok(added)
    }

    /// Pop the head without blocking.
    pub fn try_dequeue(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    /// Pop the head, parking up to `timeout` while the queue is empty.
    pub fn dequeue_or_wait(&self, timeout: Duration) -> Dequeue<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Dequeue::Item(item);
            }
            if state.closed {
                return Dequeue::Closed;
            }
            // Spurious wakeups re-check the condition; only the deadline ends the wait.
            if self.cvar.wait_until(&mut state, deadline).timed_out() {
                return match state.items.pop_front() {
                    Some(item) => Dequeue::Item(item),
                    None if state.closed => Dequeue::Closed,
                    None => Dequeue::TimedOut,
                };
            }
        }
    }

    /// Stop accepting items: queued ones are still handed out, then `Closed`.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        // notify_all: every parked worker must observe the closed flag.
        self.cvar.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Remove every queued item matching `pred`, preserving the order of the rest.
    pub fn drain_where<F>(&self, mut pred: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut state = self.state.lock();
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(state.items.len());
        for item in state.items.drain(..) {
            if pred(&item) {
                removed.push(item);
            } else {
                kept.push_back(item);
            }
        }
        state.items = kept;
        removed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }
}
