//! Video capture collaborator
//!
//! Pixel decoding of the drone's H.264 stream is left to an external decoder.
//! This module only defines the seam ([`FrameSource`]) the video listener pulls
//! from, plus [`UdpFrameCapture`], which reassembles the raw stream into
//! encoded access units without decoding them.
//!
//! The drone splits each access unit into datagrams of at most
//! [`MAX_VIDEO_PAYLOAD`] bytes; a shorter datagram ends the unit:
//!
//! ```text
//! 1460 ─┐
//! 1460 ─┼─► EncodedFrame (3_320 bytes)
//!  400 ─┘
//! ```

use crate::error::{Result, TelloError};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Largest video datagram payload the drone sends
pub const MAX_VIDEO_PAYLOAD: usize = 1460;

/// Upper bound on a reassembled unit before it is discarded as corrupt
const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Source of decoded (or encoded) frames for the video listener
pub trait FrameSource: Send + 'static {
    type Frame: Send + Sync + 'static;

    /// Whether the underlying stream is still usable
    fn is_open(&self) -> bool;

    /// Next complete frame, or `None` if none is ready yet
    ///
    /// Implementations should return within a bounded time so the listener
    /// can observe shutdown.
    fn read_frame(&mut self) -> Option<Self::Frame>;

    /// Release the stream; `is_open` must return false afterwards
    fn release(&mut self);
}

/// One H.264 access unit as sent by the drone, still encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub data: Vec<u8>,
}

/// Default capture: reassembles the UDP video stream into [`EncodedFrame`]s
pub struct UdpFrameCapture {
    socket: Option<UdpSocket>,
    buffer: Vec<u8>,
    pending: Vec<u8>,
}

impl UdpFrameCapture {
    /// Bind the video port
    ///
    /// `read_timeout` bounds each `read_frame` call. A port that cannot be
    /// bound or configured is reported as `TransportUnavailable`.
    pub fn open(addr: SocketAddr, buffer_size: usize, read_timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .and_then(|socket| {
                socket.set_read_timeout(Some(read_timeout))?;
                Ok(socket)
            })
            .map_err(|e| {
                TelloError::TransportUnavailable(format!(
                    "video capture failed to open on {}: {}",
                    addr, e
                ))
            })?;
        log::info!("Video capture bound to {}", addr);

        Ok(Self {
            socket: Some(socket),
            buffer: vec![0u8; buffer_size.max(MAX_VIDEO_PAYLOAD)],
            pending: Vec::with_capacity(64 * 1024),
        })
    }

    /// Bound address, `None` once released
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }
}

impl FrameSource for UdpFrameCapture {
    type Frame = EncodedFrame;

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn read_frame(&mut self) -> Option<EncodedFrame> {
        let socket = self.socket.as_ref()?;

        match socket.recv(&mut self.buffer) {
            Ok(len) => {
                self.pending.extend_from_slice(&self.buffer[..len]);

                if self.pending.len() > MAX_FRAME_SIZE {
                    log::warn!(
                        "Video unit exceeded {} bytes without terminator, discarding",
                        MAX_FRAME_SIZE
                    );
                    self.pending.clear();
                    return None;
                }

                if len < MAX_VIDEO_PAYLOAD {
                    let data = std::mem::take(&mut self.pending);
                    return Some(EncodedFrame { data });
                }
                None
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                None
            }
            Err(e) => {
                log::warn!("Video receive failed: {}", e);
                self.release();
                None
            }
        }
    }

    fn release(&mut self) {
        if self.socket.take().is_some() {
            log::info!("Video capture released");
        }
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_capture() -> UdpFrameCapture {
        UdpFrameCapture::open(
            "127.0.0.1:0".parse().unwrap(),
            2048,
            Duration::from_millis(200),
        )
        .unwrap()
    }

    #[test]
    fn test_reassembles_access_unit() {
        let mut capture = open_capture();
        let addr = capture.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

        sender.send_to(&[1u8; MAX_VIDEO_PAYLOAD], addr).unwrap();
        sender.send_to(&[2u8; MAX_VIDEO_PAYLOAD], addr).unwrap();
        sender.send_to(&[3u8; 400], addr).unwrap();

        assert_eq!(capture.read_frame(), None);
        assert_eq!(capture.read_frame(), None);
        let frame = capture.read_frame().unwrap();
        assert_eq!(frame.data.len(), 2 * MAX_VIDEO_PAYLOAD + 400);
        assert_eq!(frame.data[0], 1);
        assert_eq!(frame.data[MAX_VIDEO_PAYLOAD], 2);
        assert_eq!(*frame.data.last().unwrap(), 3);
    }

    #[test]
    fn test_read_times_out_without_data() {
        let mut capture = open_capture();
        assert_eq!(capture.read_frame(), None);
        assert!(capture.is_open());
    }

    #[test]
    fn test_open_on_taken_port_is_unavailable() {
        let holder = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = holder.local_addr().unwrap();

        match UdpFrameCapture::open(addr, 2048, Duration::from_millis(200)) {
            Err(TelloError::TransportUnavailable(reason)) => {
                assert!(reason.contains("video capture failed to open"));
            }
            Err(other) => panic!("expected TransportUnavailable, got {:?}", other),
            Ok(_) => panic!("expected TransportUnavailable"),
        }
    }

    #[test]
    fn test_release_closes() {
        let mut capture = open_capture();
        capture.release();
        assert!(!capture.is_open());
        assert_eq!(capture.local_addr(), None);
        assert_eq!(capture.read_frame(), None);
    }
}
