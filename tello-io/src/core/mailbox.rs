//! Single-slot, latest-value-wins mailbox
//!
//! Each stream (command replies, telemetry, video) hands values from its
//! listener thread to callers through one of these. There is no queue: a
//! value stored before the previous one was consumed replaces it.
//!
//! ```text
//! listener thread            caller thread
//!      store(v1) ──┐
//!      store(v2) ──┤  slot: Some(v2)   (v1 lost)
//!                  └────────────────► take() -> v2, slot: None
//! ```
//!
//! Waiting callers block on a condition variable that `store` signals, so a
//! reply is observed as soon as it lands instead of on the next poll tick.

use crate::core::types::Stamped;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

struct Slot<T> {
    pending: Option<Stamped<T>>,
    /// Number of values ever stored
    sequence: u64,
}

/// Thread-safe single-value handoff between one producer and its consumers
pub struct Mailbox<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Mailbox<T> {
    /// Create an empty mailbox
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                pending: None,
                sequence: 0,
            }),
            ready: Condvar::new(),
        }
    }

    /// Overwrite any pending value, returns the sequence number assigned to it
    pub fn store(&self, value: T) -> u64 {
        let mut slot = self.slot.lock();
        slot.sequence += 1;
        let sequence = slot.sequence;
        slot.pending = Some(Stamped::new(value, sequence));
        drop(slot);

        self.ready.notify_all();
        sequence
    }

    /// Take and clear the pending value
    pub fn take(&self) -> Option<T> {
        self.take_stamped().map(Stamped::into_inner)
    }

    /// Take and clear the pending value with its stamp
    pub fn take_stamped(&self) -> Option<Stamped<T>> {
        self.slot.lock().pending.take()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().pending.is_none()
    }

    /// Sequence number of the most recent `store` (0 if none yet)
    pub fn last_sequence(&self) -> u64 {
        self.slot.lock().sequence
    }

    /// Wait until a value is pending or `deadline` passes, then take it
    pub fn take_until(&self, deadline: Instant) -> Option<Stamped<T>> {
        let mut slot = self.slot.lock();
        loop {
            if let Some(value) = slot.pending.take() {
                return Some(value);
            }
            if self.ready.wait_until(&mut slot, deadline).timed_out() {
                // A store may have raced the timeout
                return slot.pending.take();
            }
        }
    }

    /// Wait up to `timeout` for a value, then take it
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        self.take_until(Instant::now() + timeout)
            .map(Stamped::into_inner)
    }

    /// Wait without limit for a value, then take it
    pub fn take_blocking(&self) -> T {
        let mut slot = self.slot.lock();
        loop {
            if let Some(value) = slot.pending.take() {
                return value.into_inner();
            }
            self.ready.wait(&mut slot);
        }
    }
}

impl<T: Clone> Mailbox<T> {
    /// Clone the pending value without clearing it
    pub fn peek(&self) -> Option<T> {
        self.peek_stamped().map(Stamped::into_inner)
    }

    pub fn peek_stamped(&self) -> Option<Stamped<T>> {
        self.slot.lock().pending.clone()
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
