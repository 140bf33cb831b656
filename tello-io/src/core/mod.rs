//! Core types and the single-slot mailbox shared by every stream

pub mod mailbox;
pub mod types;

pub use mailbox::Mailbox;
pub use types::{Stamped, TelemetrySnapshot};
