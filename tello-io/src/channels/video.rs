//! Latest-frame video buffer and the frame pump
//!
//! ```text
//! FrameSource ─► tello-video ─► VideoBuffer ─► tello-frame-pump ─► ObserverBus("frame")
//!                 (listener)    (1 slot)        (FrameEvent{sequence})
//! ```
//!
//! Reads clear the slot, so each frame is delivered at most once and frames
//! that arrive between two reads are lost except the last. The pump numbers
//! what it actually publishes: sequence ids are gap-free even when the buffer
//! dropped frames.

use crate::core::Mailbox;
use crate::error::{Result, TelloError};
use crate::observer::ObserverBus;
use crate::streaming::{FrameSource, InboundListener, ListenerHealth};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Observer key frames are published under
pub const FRAME_KEY: &str = "frame";

/// Single-slot frame buffer fed by the video listener
pub struct VideoBuffer<F> {
    frames: Arc<Mailbox<F>>,
    listener: Mutex<Option<InboundListener>>,
}

impl<F: Send + Sync + 'static> VideoBuffer<F> {
    /// Buffer without a listener; frames arrive through [`push`](Self::push)
    pub fn new() -> Self {
        Self {
            frames: Arc::new(Mailbox::new()),
            listener: Mutex::new(None),
        }
    }

    /// Start pulling frames from `capture`
    ///
    /// Fails with `TransportUnavailable` if the capture did not open.
    pub fn start<S>(mut capture: S) -> Result<Self>
    where
        S: FrameSource<Frame = F>,
    {
        if !capture.is_open() {
            capture.release();
            return Err(TelloError::TransportUnavailable(
                "video capture failed to open".to_string(),
            ));
        }

        let frames = Arc::new(Mailbox::new());
        let listener = InboundListener::spawn_capture("tello-video", capture, Arc::clone(&frames))?;

        Ok(Self {
            frames,
            listener: Mutex::new(Some(listener)),
        })
    }

    /// Replace the pending frame
    pub fn push(&self, frame: F) -> u64 {
        self.frames.store(frame)
    }

    /// Block until a frame is available, then take it
    pub fn read(&self) -> F {
        self.frames.take_blocking()
    }

    pub fn try_read(&self) -> Option<F> {
        self.frames.take()
    }

    /// Wait up to `timeout` for a frame
    pub fn read_timeout(&self, timeout: Duration) -> Option<F> {
        self.frames.take_timeout(timeout)
    }

    /// Health of the capture listener, `None` for a detached buffer
    pub fn health(&self) -> Option<ListenerHealth> {
        self.listener.lock().as_ref().map(InboundListener::health)
    }

    /// Stop the capture listener, releasing the capture (idempotent)
    pub fn close(&self) {
        if let Some(mut listener) = self.listener.lock().take() {
            listener.stop();
        }
    }
}

impl<F: Send + Sync + 'static> Default for VideoBuffer<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// One published frame
#[derive(Debug)]
pub struct FrameEvent<F> {
    /// 0 for the first published frame, +1 per publish
    pub sequence: u64,
    pub frame: Arc<F>,
}

impl<F> Clone for FrameEvent<F> {
    fn clone(&self) -> Self {
        Self {
            sequence: self.sequence,
            frame: Arc::clone(&self.frame),
        }
    }
}

/// Moves frames from a [`VideoBuffer`] to [`FRAME_KEY`] observers
pub struct FramePump<F> {
    buffer: Arc<VideoBuffer<F>>,
    bus: Arc<ObserverBus<FrameEvent<F>>>,
    next_sequence: u64,
}

impl<F: Send + Sync + 'static> FramePump<F> {
    pub fn new(buffer: Arc<VideoBuffer<F>>, bus: Arc<ObserverBus<FrameEvent<F>>>) -> Self {
        Self {
            buffer,
            bus,
            next_sequence: 0,
        }
    }

    /// Wait up to `timeout` for a frame and publish it
    ///
    /// Returns the sequence id assigned, or `None` if no frame arrived.
    pub fn pump_once(&mut self, timeout: Duration) -> Option<u64> {
        let frame = self.buffer.read_timeout(timeout)?;

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let event = FrameEvent {
            sequence,
            frame: Arc::new(frame),
        };
        let delivered = self.bus.publish(FRAME_KEY, event);
        log::trace!("Frame {} published to {} observers", sequence, delivered);

        Some(sequence)
    }

    /// Frames published so far
    pub fn published(&self) -> u64 {
        self.next_sequence
    }

    /// Run the pump on its own thread until stopped
    ///
    /// `poll_interval` bounds each wait so the thread notices `stop`.
    pub fn spawn(mut self, poll_interval: Duration) -> Result<FramePumpHandle> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let published = Arc::new(AtomicU64::new(0));

        let thread_shutdown = Arc::clone(&shutdown);
        let thread_published = Arc::clone(&published);
        let handle = thread::Builder::new()
            .name("tello-frame-pump".to_string())
            .spawn(move || {
                log::info!("Frame pump started");
                while !thread_shutdown.load(Ordering::Relaxed) {
                    if self.pump_once(poll_interval).is_some() {
                        thread_published.store(self.published(), Ordering::Relaxed);
                    }
                }
                log::info!("Frame pump stopped after {} frames", self.published());
            })
            .map_err(|e| TelloError::Thread(format!("Failed to spawn frame pump: {}", e)))?;

        Ok(FramePumpHandle {
            shutdown,
            published,
            handle: Some(handle),
        })
    }
}

/// Running frame pump thread
pub struct FramePumpHandle {
    shutdown: Arc<AtomicBool>,
    published: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl FramePumpHandle {
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the pump to exit and join it (idempotent)
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("Frame pump thread panicked");
        }
    }
}

impl Drop for FramePumpHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
