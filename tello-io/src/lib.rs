//! TelloIO - UDP client for Tello quadcopters
//!
//! Turns the drone's connectionless text protocol into a usable
//! command/response API, and buffers the two broadcast streams it sends back:
//!
//! | Stream | Local port | Buffering |
//! |--------|------------|-----------|
//! | command replies | 9999 | one reply, taken by the waiting command |
//! | telemetry | 8890 | latest snapshot, never cleared |
//! | video | 11111 | latest frame, cleared on read, fanned out to observers |
//!
//! ```no_run
//! use tello_io::{Reply, Session, TelloConfig};
//!
//! let mut session = Session::connect(TelloConfig::default())?;
//! session.take_off(Reply::Wait)?;
//! println!("battery: {}%", session.battery()?);
//! session.land(Reply::Wait)?;
//! session.close();
//! # Ok::<(), tello_io::TelloError>(())
//! ```
//!
//! The library logs through the `log` facade and never installs a logger.

pub mod channels;
pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod observer;
pub mod session;
pub mod streaming;

// Re-export commonly used types
pub use channels::{CommandChannel, FrameEvent, Reply, TelemetryChannel, VideoBuffer};
pub use commands::{Command, FlipDirection, Query};
pub use config::TelloConfig;
pub use error::{Result, TelloError};
pub use observer::{Observer, ObserverBus};
pub use session::{Session, SessionHealth};
pub use streaming::{EncodedFrame, FrameSource, UdpFrameCapture};
