//! Inbound UDP streams: decoders, listener threads and the video capture seam

pub mod capture;
pub mod codec;
pub mod listener;

pub use capture::{EncodedFrame, FrameSource, UdpFrameCapture, MAX_VIDEO_PAYLOAD};
pub use listener::{InboundListener, ListenerHealth};
