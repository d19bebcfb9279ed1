//! Bounded hand-off queues.
//!
//! The pool routes connections between two of these: one holding usable
//! connections for callers, one holding connections waiting to be dialed.
//! Each item lives in exactly one queue at a time because ownership moves
//! with it.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;

/// Bounded FIFO with blocking and timed dequeue.
///
/// The semaphore holds one permit per queued item, so a dequeuer that wins
/// a permit is guaranteed to find an item behind the lock.
#[derive(Debug)]
pub struct HandoffQueue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Semaphore,
    capacity: usize,
}

impl<T> HandoffQueue<T> {
    /// Create an empty queue holding at most `capacity` items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Semaphore::new(0),
            capacity,
        }
    }

    /// Enqueue without waiting.
    ///
    /// Hands the item back if the queue is full.
    pub fn push(&self, item: T) -> Result<(), T> {
        {
            let mut items = self.items.lock();
            if items.len() >= self.capacity {
                return Err(item);
            }
            items.push_back(item);
        }
        self.ready.add_permits(1);
        Ok(())
    }

    /// Dequeue, waiting until an item is available.
    ///
    /// Cancel-safe: dropping the future before it completes takes nothing.
    pub async fn pop(&self) -> Option<T> {
        let permit = self.ready.acquire().await.ok()?;
        permit.forget();
        self.items.lock().pop_front()
    }

    /// Dequeue, giving up after `timeout`.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.pop()).await.ok().flatten()
    }

    /// Dequeue only if an item is ready right now.
    pub fn try_pop(&self) -> Option<T> {
        let permit = self.ready.try_acquire().ok()?;
        permit.forget();
        self.items.lock().pop_front()
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued items.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
