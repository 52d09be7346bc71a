//! # Handoff Channel
//!
//! A bounded blocking queue used to pass values between tasks.
//!
//! - `push` suspends the caller while `capacity` values are pending.
//! - `pop` suspends the caller while the channel is empty.
//! - Values are delivered FIFO across all producers, and a popped value is
//!   never observed again.
//! - Waiters of the same kind are served in the order they suspended. Each
//!   operation draws a ticket and only proceeds when its ticket is the next one
//!   to be served, so a late arrival cannot overtake a parked waiter.
//!
//! The channel is built on `may::sync::{Mutex, Condvar}`: a waiting coroutine
//! yields to the scheduler instead of parking its OS thread, and the same channel
//! can be used from plain threads (which block).
//!
//! There is no close operation. A `pop` on a channel that will never receive
//! another value blocks forever; callers that may give up should send an
//! explicit sentinel (for example a `Result`) instead of waiting for a timeout.

use may::sync::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, PoisonError};

use crate::error::{Error, Result};

struct ChannelState<T> {
    queue: VecDeque<T>,
    next_push_ticket: u64,
    serving_push: u64,
    next_pop_ticket: u64,
    serving_pop: u64,
}

struct Shared<T> {
    capacity: usize,
    state: Mutex<ChannelState<T>>,
    /// Signalled when a slot frees up or the push line advances
    not_full: Condvar,
    /// Signalled when a value arrives or the pop line advances
    not_empty: Condvar,
}

/// Cloneable handle to a bounded handoff channel.
///
/// All clones refer to the same queue; hand one clone to each task that
/// produces or consumes.
pub struct HandoffChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for HandoffChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for HandoffChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandoffChannel")
            .field("capacity", &self.shared.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl<T> HandoffChannel<T> {
    /// Create a channel holding at most `capacity` pending values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < 1 {
            return Err(Error::invalid(format!(
                "channel capacity must be at least 1, got {capacity}"
            )));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                capacity,
                state: Mutex::new(ChannelState {
                    queue: VecDeque::with_capacity(capacity),
                    next_push_ticket: 0,
                    serving_push: 0,
                    next_pop_ticket: 0,
                    serving_pop: 0,
                }),
                not_full: Condvar::new(),
                not_empty: Condvar::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState<T>> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `value`, suspending while the channel is full.
    pub fn push(&self, value: T) {
        let mut state = self.lock();
        let ticket = state.next_push_ticket;
        state.next_push_ticket += 1;

        while ticket != state.serving_push || state.queue.len() >= self.shared.capacity {
            state = self
                .shared
                .not_full
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        state.queue.push_back(value);
        state.serving_push += 1;
        drop(state);

        // Wake the next pusher in line and any parked popper.
        self.shared.not_full.notify_all();
        self.shared.not_empty.notify_all();
    }

    /// Dequeue the oldest value, suspending while the channel is empty.
    #[must_use = "a popped value cannot be observed again"]
    pub fn pop(&self) -> T {
        let mut state = self.lock();
        let ticket = state.next_pop_ticket;
        state.next_pop_ticket += 1;

        loop {
            if ticket == state.serving_pop {
                if let Some(value) = state.queue.pop_front() {
                    state.serving_pop += 1;
                    drop(state);
                    self.shared.not_empty.notify_all();
                    self.shared.not_full.notify_all();
                    return value;
                }
            }
            state = self
                .shared
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Enqueue without waiting. Hands the value back when the channel is full
    /// or other pushers are already queued.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` when the value could not be enqueued immediately.
    pub fn try_push(&self, value: T) -> std::result::Result<(), T> {
        let mut state = self.lock();
        let line_empty = state.next_push_ticket == state.serving_push;
        if !line_empty || state.queue.len() >= self.shared.capacity {
            return Err(value);
        }
        state.next_push_ticket += 1;
        state.serving_push += 1;
        state.queue.push_back(value);
        drop(state);
        self.shared.not_empty.notify_all();
        Ok(())
    }

    /// Dequeue without waiting. Returns `None` when the channel is empty or
    /// other poppers are already queued.
    #[must_use]
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.lock();
        if state.next_pop_ticket != state.serving_pop {
            return None;
        }
        let value = state.queue.pop_front()?;
        state.next_pop_ticket += 1;
        state.serving_pop += 1;
        drop(state);
        self.shared.not_full.notify_all();
        Some(value)
    }

    /// Number of values currently pending.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}
