//! Per-stream channels owning a socket, its listener and its mailbox

pub mod command;
pub mod telemetry;
pub mod video;

pub use command::{CommandChannel, Reply};
pub use telemetry::TelemetryChannel;
pub use video::{FRAME_KEY, FrameEvent, FramePump, FramePumpHandle, VideoBuffer};
