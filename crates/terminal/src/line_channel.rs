//! Hand-off of completed input lines to a program waiting for input.
//!
//! The UI thread submits lines; an evaluation thread blocks in
//! [`LineChannel::receive_line`] until one arrives. The queue and the wait
//! predicate live under one lock, so a `submit` racing with a consumer that is
//! about to sleep can never be lost.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

use settings::constants::input::QUEUE_CAPACITY;

#[derive(Debug, Default)]
struct ChannelState {
    pending: VecDeque<String>,
    /// Consumers currently parked in `receive_line`.
    waiters: usize,
    closed: bool,
    /// Bumped by `interrupt`; a waiter that sees it change gives up.
    interrupts: u64,
}

/// Bounded FIFO of input lines with a blocking receive.
///
/// Capacity is small: when a program is not reading, the oldest buffered
/// line is dropped to make room for a new one.
#[derive(Debug)]
pub struct LineChannel {
    state: Mutex<ChannelState>,
    available: Condvar,
    capacity: usize,
}

impl Default for LineChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl LineChannel {
    pub fn new() -> Self {
        Self::with_capacity(QUEUE_CAPACITY)
    }

    /// Create a channel holding at most `capacity` undelivered lines (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(ChannelState::default()),
            available: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue a line and wake one blocked consumer.
    pub fn submit(&self, line: impl Into<String>) {
        let line = line.into();
        let mut state = self.state.lock();
        if state.closed {
            tracing::debug!("Input channel closed, dropping submitted line");
            return;
        }
        if state.pending.len() >= self.capacity {
            if let Some(dropped) = state.pending.pop_front() {
                tracing::warn!(
                    capacity = self.capacity,
                    dropped_chars = dropped.chars().count(),
                    "Input queue full, dropping oldest line"
                );
            }
        }
        state.pending.push_back(line);
        drop(state);
        self.available.notify_one();
    }

    /// Block until a line is available and return it.
    ///
    /// Returns `None` (end of input) once the channel is closed, or when
    /// [`interrupt`](Self::interrupt) is called while this call is waiting.
    /// Never call this from the UI thread.
    pub fn receive_line(&self) -> Option<String> {
        let mut state = self.state.lock();
        let epoch = state.interrupts;
        loop {
            if state.closed || state.interrupts != epoch {
                return None;
            }
            if let Some(line) = state.pending.pop_front() {
                return Some(line);
            }
            state.waiters += 1;
            self.available.wait(&mut state);
            state.waiters -= 1;
        }
    }

    /// Pop the oldest line without blocking.
    pub fn try_receive(&self) -> Option<String> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        state.pending.pop_front()
    }

    /// True while some consumer is parked waiting for a line.
    pub fn is_blocked(&self) -> bool {
        self.state.lock().waiters > 0
    }

    /// Discard every undelivered line. Blocked consumers keep waiting.
    pub fn try_flush(&self) {
        let mut state = self.state.lock();
        if !state.pending.is_empty() {
            tracing::debug!(discarded = state.pending.len(), "Flushing pending input");
            state.pending.clear();
        }
    }

    /// Wake consumers blocked right now with end of input, without closing.
    pub fn interrupt(&self) {
        let mut state = self.state.lock();
        state.interrupts = state.interrupts.wrapping_add(1);
        drop(state);
        self.available.notify_all();
    }

    /// Permanently end input: pending lines are discarded and every current
    /// and future `receive_line` returns `None`.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.pending.clear();
        drop(state);
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }
}
