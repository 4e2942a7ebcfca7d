//! Bounded sensor queues.
//!
//! Producers never block: when a queue is full the oldest element is
//! overwritten and counted as dropped. The consumer is woken through a
//! `Notify` and waits with a bound.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug)]
pub struct SensorQueue<T> {
    name: &'static str,
    buffer: ArrayQueue<T>,
    notify: Notify,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl<T> SensorQueue<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        SensorQueue {
            name,
            buffer: ArrayQueue::new(capacity.max(1)),
            notify: Notify::new(),
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Push, evicting the oldest element when full. Returns true when an
    /// element was evicted.
    pub fn push(&self, item: T) -> bool {
        self.pushed.fetch_add(1, Ordering::Relaxed);
        let evicted = self.buffer.force_push(item).is_some();
        if evicted {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped.is_power_of_two() {
                log::warn!("{} queue full, {} elements dropped so far", self.name, dropped);
            }
        }
        self.notify.notify_one();
        evicted
    }

    pub fn try_pop(&self) -> Option<T> {
        self.buffer.pop()
    }

    /// Pop, waiting at most `wait` for an element to arrive.
    pub async fn pop_timeout(&self, wait: Duration) -> Option<T> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(item) = self.buffer.pop() {
                return Some(item);
            }
            // A permit left by an already consumed push wakes us early; retry
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return self.buffer.pop();
            }
        }
    }

    /// Resolves on the next push (or immediately if a push was not yet observed).
    pub async fn notified(&self) {
        self.notify.notified().await
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
