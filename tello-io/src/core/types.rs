//! Core data types passed between listener threads and callers.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Flat attribute map decoded from one telemetry datagram
/// (`pitch`, `roll`, `yaw`, `vgx`, `h`, `bat`, `baro`, `agx`, ...)
pub type TelemetrySnapshot = HashMap<String, f64>;

/// A value as it was stored in a [`Mailbox`](crate::core::Mailbox)
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub value: T,
    /// Per-mailbox store counter, starts at 1
    pub sequence: u64,
    /// When the listener stored the value
    pub received_at: Instant,
}

impl<T> Stamped<T> {
    pub fn new(value: T, sequence: u64) -> Self {
        Self {
            value,
            sequence,
            received_at: Instant::now(),
        }
    }

    /// Time since the value arrived
    #[inline]
    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Stamped<U> {
        Stamped {
            value: f(self.value),
            sequence: self.sequence,
            received_at: self.received_at,
        }
    }
}
