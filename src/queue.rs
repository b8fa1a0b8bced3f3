//! Bounded Frame Queue (spec.md §4.3): the seam between capture (producer)
//! and encoder (consumer).
//!
//! A grow-on-push ring buffer guarded by a mutex, with a condition variable
//! playing the role of both the "new-frame" counting signal and the
//! "producer-done" one-shot signal described in spec.md. Concurrency
//! contract: exactly one producer, exactly one consumer.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::image::Frame;

const INITIAL_CAPACITY: usize = 8;

struct State {
    ring: VecDeque<Frame>,
    closed: bool,
}

/// FIFO frame queue shared between the capture producer and the encode consumer.
pub struct FrameQueue {
    state: Mutex<State>,
    new_frame: Condvar,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State { ring: VecDeque::with_capacity(INITIAL_CAPACITY), closed: false }),
            new_frame: Condvar::new(),
        }
    }

    /// O(1) amortized; the backing ring doubles its capacity on overflow
    /// (the same growth `VecDeque` already gives us from an explicit
    /// `with_capacity(8)` starting point).
    pub fn push(&self, frame: Frame) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.ring.push_back(frame);
        drop(state);
        self.new_frame.notify_one();
    }

    /// Marks the producer as done. Idempotent, and wakes a consumer blocked
    /// in [`Self::pop_blocking`] so it can observe an empty, closed queue.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.closed = true;
        drop(state);
        self.new_frame.notify_all();
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).ring.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).ring.len()
    }

    /// Non-blocking pop; `None` if the queue is currently empty.
    pub fn pop(&self) -> Option<Frame> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).ring.pop_front()
    }

    /// Blocks until a frame is available or the queue has been closed and
    /// drained. Returns `None` only once both are true, which is the
    /// consumer's signal to call `gif.close()` and exit (spec.md §4.7).
    pub fn pop_blocking(&self) -> Option<Frame> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(frame) = state.ring.pop_front() {
                return Some(frame);
            }
            if state.closed {
                return None;
            }
            state = self.new_frame.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}
