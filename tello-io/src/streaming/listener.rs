//! Background receive loops feeding mailboxes
//!
//! One listener thread per inbound stream:
//!
//! | Thread | Socket | Decoder | Mailbox |
//! |--------|--------|---------|---------|
//! | `tello-replies` | local command port | [`decode_reply`] | `Mailbox<String>` |
//! | `tello-telemetry` | 8890 | [`decode_telemetry`] | `Mailbox<TelemetrySnapshot>` |
//! | `tello-video` | 11111 (via [`FrameSource`]) | capture collaborator | `Mailbox<Frame>` |
//!
//! # Shutdown
//!
//! `std::net::UdpSocket` cannot be closed from another thread while a
//! `recv` is blocked on it, so listener sockets carry a short read timeout.
//! Every timeout re-checks the shutdown flag; [`InboundListener::stop`] sets
//! the flag and joins the thread, which drops the socket.
//!
//! # Failure
//!
//! Any other receive error ends the loop. The error is not propagated to a
//! caller (there is none on this thread); it is logged and recorded in the
//! listener's [`ListenerHealth`] so the session can report a dead stream
//! instead of only timing out on the next command.
//!
//! [`decode_reply`]: crate::streaming::codec::decode_reply
//! [`decode_telemetry`]: crate::streaming::codec::decode_telemetry

use crate::core::Mailbox;
use crate::error::{Result, TelloError};
use crate::streaming::capture::FrameSource;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct HealthState {
    alive: AtomicBool,
    received: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// Observable liveness of a listener thread
#[derive(Clone)]
pub struct ListenerHealth {
    inner: Arc<HealthState>,
}

impl ListenerHealth {
    fn new() -> Self {
        Self {
            inner: Arc::new(HealthState {
                alive: AtomicBool::new(true),
                received: AtomicU64::new(0),
                last_error: Mutex::new(None),
            }),
        }
    }

    /// Whether the receive loop is still running
    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::Acquire)
    }

    /// Number of values stored into the mailbox so far
    pub fn received(&self) -> u64 {
        self.inner.received.load(Ordering::Relaxed)
    }

    /// Error that terminated the loop, if it did not stop cleanly
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().clone()
    }

    fn record_received(&self) {
        self.inner.received.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self, error: String) {
        *self.inner.last_error.lock() = Some(error);
    }

    fn mark_stopped(&self) {
        self.inner.alive.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for ListenerHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHealth")
            .field("alive", &self.is_alive())
            .field("received", &self.received())
            .field("last_error", &self.last_error())
            .finish()
    }
}

/// Handle to a running receive loop
pub struct InboundListener {
    name: String,
    shutdown: Arc<AtomicBool>,
    health: ListenerHealth,
    handle: Option<JoinHandle<()>>,
}

impl InboundListener {
    /// Spawn a thread that receives datagrams on `socket`, decodes them and
    /// stores the result in `mailbox`
    ///
    /// `poll_interval` is the socket read timeout and bounds how long
    /// [`stop`](Self::stop) waits for the thread.
    pub fn spawn<T, D>(
        name: &str,
        socket: UdpSocket,
        buffer_size: usize,
        poll_interval: Duration,
        decode: D,
        mailbox: Arc<Mailbox<T>>,
    ) -> Result<Self>
    where
        T: Send + 'static,
        D: Fn(&[u8]) -> T + Send + 'static,
    {
        socket.set_read_timeout(Some(poll_interval))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let health = ListenerHealth::new();

        let thread_name = name.to_string();
        let thread_shutdown = Arc::clone(&shutdown);
        let thread_health = health.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                receive_loop(
                    &thread_name,
                    socket,
                    buffer_size,
                    decode,
                    &mailbox,
                    &thread_shutdown,
                    &thread_health,
                );
                thread_health.mark_stopped();
            })
            .map_err(|e| TelloError::Thread(format!("Failed to spawn {}: {}", name, e)))?;

        Ok(Self {
            name: name.to_string(),
            shutdown,
            health,
            handle: Some(handle),
        })
    }

    /// Spawn a thread that pulls frames from `capture` into `mailbox`
    ///
    /// The loop ends when the capture reports closed or on `stop`; the
    /// capture is released on the listener thread either way.
    pub fn spawn_capture<S>(
        name: &str,
        capture: S,
        mailbox: Arc<Mailbox<S::Frame>>,
    ) -> Result<Self>
    where
        S: FrameSource,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let health = ListenerHealth::new();

        let thread_name = name.to_string();
        let thread_shutdown = Arc::clone(&shutdown);
        let thread_health = health.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                capture_loop(
                    &thread_name,
                    capture,
                    &mailbox,
                    &thread_shutdown,
                    &thread_health,
                );
                thread_health.mark_stopped();
            })
            .map_err(|e| TelloError::Thread(format!("Failed to spawn {}: {}", name, e)))?;

        Ok(Self {
            name: name.to_string(),
            shutdown,
            health,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn health(&self) -> ListenerHealth {
        self.health.clone()
    }

    /// Signal the loop to exit and wait for the thread (idempotent)
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("{}: listener thread panicked", self.name);
            }
            log::debug!("{}: listener joined", self.name);
        }
    }
}

impl Drop for InboundListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop<T, D>(
    name: &str,
    socket: UdpSocket,
    buffer_size: usize,
    decode: D,
    mailbox: &Mailbox<T>,
    shutdown: &AtomicBool,
    health: &ListenerHealth,
) where
    D: Fn(&[u8]) -> T,
{
    // Reuse one buffer for every datagram
    let mut buffer = vec![0u8; buffer_size.max(1)];

    match socket.local_addr() {
        Ok(addr) => log::info!("{}: listening on {}", name, addr),
        Err(_) => log::info!("{}: listening", name),
    }

    while !shutdown.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buffer) {
            Ok((len, from)) => {
                log::trace!("{}: {} bytes from {}", name, len, from);
                mailbox.store(decode(&buffer[..len]));
                health.record_received();
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                log::warn!("{}: receive failed, listener stopping: {}", name, e);
                health.record_failure(e.to_string());
                return;
            }
        }
    }

    log::info!("{}: listener stopped", name);
}

fn capture_loop<S: FrameSource>(
    name: &str,
    mut capture: S,
    mailbox: &Mailbox<S::Frame>,
    shutdown: &AtomicBool,
    health: &ListenerHealth,
) {
    log::info!("{}: capture started", name);

    while !shutdown.load(Ordering::Relaxed) {
        if !capture.is_open() {
            log::warn!("{}: capture closed, listener stopping", name);
            health.record_failure("capture closed".to_string());
            break;
        }
        if let Some(frame) = capture.read_frame() {
            mailbox.store(frame);
            health.record_received();
        }
    }

    capture.release();
    log::info!("{}: capture stopped", name);
}
