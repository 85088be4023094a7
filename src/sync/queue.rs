//! A FIFO with an optional capacity bound, blocking push/pop, and a timed
//! pop variant.
//!
//! Grounded on `xjj::BlockingQueue` (`include/blocking_queue.hpp` in the
//! original source): a `std::queue` guarded by a mutex plus a "not full" and
//! a "not empty" condition variable. The Rust port collapses both condition
//! variables into one `Condvar` shared by a single `Mutex<VecDeque<T>>`,
//! since `std::sync::Condvar` doesn't distinguish which waiters to wake and
//! `notify_all` on every mutation is cheap at this queue's depths.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Blocking, optionally-bounded FIFO queue.
#[derive(Debug)]
pub struct BlockingQueue<T> {
    state: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    max_len: usize,
}

impl<T> BlockingQueue<T> {
    /// Builds a queue with no capacity bound.
    pub fn new() -> Self {
        Self::bounded(usize::MAX)
    }

    /// Builds a queue that blocks `push` once `max_len` elements are queued.
    pub fn bounded(max_len: usize) -> Self {
        Self {
            state: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            max_len,
        }
    }

    /// Enqueues `value`, blocking while the queue is at capacity.
    pub fn push(&self, value: T) {
        let mut queue = self.state.lock().unwrap();
        queue = self
            .not_full
            .wait_while(queue, |q| q.len() >= self.max_len)
            .unwrap();
        queue.push_back(value);
        drop(queue);
        self.not_empty.notify_one();
    }

    /// Dequeues the front element, blocking while the queue is empty.
    pub fn pop(&self) -> T {
        let mut queue = self.state.lock().unwrap();
        queue = self.not_empty.wait_while(queue, |q| q.is_empty()).unwrap();
        let value = queue.pop_front().expect("queue non-empty after wait");
        drop(queue);
        self.not_full.notify_one();
        value
    }

    /// Dequeues the front element, waiting at most `timeout` if the queue is
    /// empty. Returns `None` if the deadline passed with nothing to pop.
    pub fn timed_pop(&self, timeout: Duration) -> Option<T> {
        let queue = self.state.lock().unwrap();
        let (mut queue, _timeout_result) = self
            .not_empty
            .wait_timeout_while(queue, timeout, |q| q.is_empty())
            .unwrap();

        let value = queue.pop_front();
        drop(queue);
        if value.is_some() {
            self.not_full.notify_one();
        }
        value
    }

    /// Removes every queued element.
    pub fn clear(&self) {
        let mut queue = self.state.lock().unwrap();
        queue.clear();
        drop(queue);
        self.not_full.notify_all();
    }

    /// Returns `true` if the queue currently holds no elements.
    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().is_empty()
    }

    /// Returns the number of currently queued elements.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().len()
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
