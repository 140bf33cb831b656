//! Keyed observer fan-out
//!
//! Producers publish a value under a key (e.g. `"frame"`); every observer
//! registered for that key gets its own copy, delivered on its own worker
//! thread.
//!
//! # Delivery Model
//!
//! ```text
//!                      ┌─ bounded queue ─► worker ─► observer A
//! publish("frame", v) ─┤
//!                      └─ bounded queue ─► worker ─► observer B
//! ```
//!
//! - `publish` never blocks: values are handed over with `try_send`.
//! - A slow observer only fills its own queue. Once full, further values for
//!   that observer are dropped (drop-newest) and counted; other observers and
//!   the producer are unaffected.
//! - There is no ordering between observers. Each observer sees its own
//!   values in publish order.
//! - A panicking observer is logged and keeps receiving later values.
//!
//! Registrations are append-only for the lifetime of the bus. Dropping the
//! bus closes every queue and joins the workers after they drain; a worker
//! still stuck in `notify` after a short grace period is detached and logged.

use crate::error::{Result, TelloError};
use crossbeam_channel::{Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long dropping the bus waits for workers to drain
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Receiver of published values
pub trait Observer<V>: Send + Sync + 'static {
    fn notify(&self, key: &str, value: V);
}

impl<V, F> Observer<V> for F
where
    F: Fn(&str, V) + Send + Sync + 'static,
{
    fn notify(&self, key: &str, value: V) {
        self(key, value)
    }
}

struct Registration<V> {
    sender: Sender<V>,
    worker: Option<JoinHandle<()>>,
}

/// Registry of observers keyed by event kind
pub struct ObserverBus<V> {
    queue_depth: usize,
    registry: RwLock<HashMap<String, Vec<Registration<V>>>>,
    dropped: Arc<AtomicU64>,
}

impl<V: Clone + Send + 'static> ObserverBus<V> {
    /// Create a bus whose observers each buffer up to `queue_depth` values
    pub fn new(queue_depth: usize) -> Self {
        Self {
            queue_depth: queue_depth.max(1),
            registry: RwLock::new(HashMap::new()),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append `observer` to the list for `key` and start its worker
    pub fn register<O: Observer<V>>(&self, key: &str, observer: O) -> Result<()> {
        let (sender, receiver) = crossbeam_channel::bounded::<V>(self.queue_depth);

        let mut registry = self.registry.write();
        let index = registry.get(key).map_or(0, Vec::len);
        let worker_key = key.to_string();

        let worker = thread::Builder::new()
            .name(format!("observer-{}-{}", key, index))
            .spawn(move || {
                for value in receiver.iter() {
                    let result =
                        panic::catch_unwind(AssertUnwindSafe(|| observer.notify(&worker_key, value)));
                    if result.is_err() {
                        log::error!("Observer {} for '{}' panicked", index, worker_key);
                    }
                }
                log::debug!("Observer {} for '{}' stopped", index, worker_key);
            })
            .map_err(|e| TelloError::Thread(format!("Failed to spawn observer worker: {}", e)))?;

        registry
            .entry(key.to_string())
            .or_default()
            .push(Registration {
                sender,
                worker: Some(worker),
            });

        log::debug!("Registered observer {} for '{}'", index, key);
        Ok(())
    }

    /// Hand `value` to every observer of `key`
    ///
    /// Returns how many observers accepted it. Publishing to a key nobody
    /// observes is a no-op.
    pub fn publish(&self, key: &str, value: V) -> usize {
        let registry = self.registry.read();
        let Some(registrations) = registry.get(key) else {
            return 0;
        };

        let mut delivered = 0;
        for (index, registration) in registrations.iter().enumerate() {
            match registration.sender.try_send(value.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    log::debug!("Observer {} for '{}' is behind, value dropped", index, key);
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::warn!("Observer {} for '{}' is gone", index, key);
                }
            }
        }
        delivered
    }

    pub fn observer_count(&self, key: &str) -> usize {
        self.registry.read().get(key).map_or(0, Vec::len)
    }

    /// Values discarded because an observer's queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<V> Drop for ObserverBus<V> {
    fn drop(&mut self) {
        let registry = std::mem::take(&mut *self.registry.write());

        // Close every queue first so all workers drain concurrently
        let mut workers = Vec::new();
        for (key, registrations) in registry {
            for (index, registration) in registrations.into_iter().enumerate() {
                let Registration { sender, worker } = registration;
                drop(sender);
                if let Some(handle) = worker {
                    workers.push((key.clone(), index, handle));
                }
            }
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        for (key, index, handle) in workers {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }

            if !handle.is_finished() {
                log::warn!(
                    "Observer {} for '{}' still busy after {:?}, detaching",
                    index,
                    key,
                    SHUTDOWN_GRACE
                );
            } else if handle.join().is_err() {
                log::error!("Observer worker panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::RecvTimeoutError;
    use std::sync::Mutex;

    const WAIT: Duration = Duration::from_secs(2);

    #[test]
    fn test_publish_without_observers_is_noop() {
        let bus: ObserverBus<u32> = ObserverBus::new(4);
        assert_eq!(bus.publish("frame", 1), 0);
        assert_eq!(bus.observer_count("frame"), 0);
        assert_eq!(bus.dropped(), 0);
    }

    #[test]
    fn test_fan_out_to_every_observer() {
        let bus: ObserverBus<u32> = ObserverBus::new(4);
        let (tx, rx) = crossbeam_channel::unbounded();

        for name in ["a", "b", "c"] {
            let tx = tx.clone();
            bus.register("frame", move |key: &str, value: u32| {
                tx.send((name, key.to_string(), value)).unwrap();
            })
            .unwrap();
        }

        assert_eq!(bus.publish("frame", 7), 3);

        let mut seen: Vec<_> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("a", "frame".to_string(), 7),
                ("b", "frame".to_string(), 7),
                ("c", "frame".to_string(), 7),
            ]
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let bus: ObserverBus<u32> = ObserverBus::new(4);
        let (tx, rx) = crossbeam_channel::unbounded();
        bus.register("state", move |_: &str, value: u32| {
            tx.send(value).unwrap();
        })
        .unwrap();

        assert_eq!(bus.publish("frame", 1), 0);
        assert_eq!(bus.publish("state", 2), 1);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 2);
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(50)),
            Err(RecvTimeoutError::Timeout)
        );
    }

    #[test]
    fn test_slow_observer_does_not_block_publisher_or_others() {
        let bus: ObserverBus<u32> = ObserverBus::new(1);
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let (fast_tx, fast_rx) = crossbeam_channel::unbounded();

        // Blocks inside notify until the gate opens
        bus.register("frame", move |_: &str, _: u32| {
            let _ = gate_rx.recv();
        })
        .unwrap();
        bus.register("frame", move |_: &str, value: u32| {
            fast_tx.send(value).unwrap();
        })
        .unwrap();

        for i in 0..10 {
            bus.publish("frame", i);
            // Let the fast observer keep up with a queue depth of 1
            assert_eq!(fast_rx.recv_timeout(WAIT).unwrap(), i);
        }

        // Slow observer holds one value in notify and one queued; the rest dropped
        assert!(bus.dropped() >= 7);

        drop(gate_tx);
    }

    #[test]
    fn test_panicking_observer_keeps_receiving() {
        let bus: ObserverBus<u32> = ObserverBus::new(4);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&calls);
        let (done_tx, done_rx) = crossbeam_channel::unbounded();

        bus.register("frame", move |_: &str, value: u32| {
            recorded.lock().unwrap().push(value);
            if value == 1 {
                panic!("observer failure");
            }
            done_tx.send(value).unwrap();
        })
        .unwrap();

        bus.publish("frame", 1);
        bus.publish("frame", 2);
        assert_eq!(done_rx.recv_timeout(WAIT).unwrap(), 2);
        assert_eq!(*calls.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_drop_drains_and_joins_workers() {
        let bus: ObserverBus<u32> = ObserverBus::new(8);
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        bus.register("frame", move |_: &str, _: u32| {
            thread::sleep(Duration::from_millis(5));
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        for i in 0..5 {
            bus.publish("frame", i);
        }
        drop(bus);
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_drop_detaches_blocked_observer() {
        let bus: ObserverBus<u32> = ObserverBus::new(4);
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();

        bus.register("frame", move |_: &str, _: u32| {
            entered_tx.send(()).unwrap();
            let _ = gate_rx.recv();
        })
        .unwrap();

        bus.publish("frame", 1);
        entered_rx.recv_timeout(WAIT).unwrap();

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            drop(bus);
            done_tx.send(()).unwrap();
        });

        // Observer is still blocked, yet the drop completes
        assert!(done_rx.recv_timeout(WAIT).is_ok());
        drop(gate_tx);
    }
}
