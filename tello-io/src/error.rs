//! Error types for TelloIO

use std::time::Duration;

/// Result type alias
pub type Result<T> = std::result::Result<T, TelloError>;

/// TelloIO error types
#[derive(Debug, thiserror::Error)]
pub enum TelloError {
    /// Drone answered a mandatory command with something other than `ok`
    #[error("Drone rejected '{command}' (replied '{reply}')")]
    HandshakeRejected {
        /// Command that was rejected (`command` or `streamon`)
        command: String,
        /// Verbatim reply
        reply: String,
    },

    /// No reply arrived within the configured timeout
    #[error("No response to '{command}' within {timeout:?}")]
    CommandTimeout {
        /// Command that went unanswered
        command: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// Reply to a query could not be parsed as a number
    #[error("Malformed reply to '{command}': '{reply}'")]
    MalformedReply {
        /// Query command
        command: String,
        /// Verbatim reply
        reply: String,
    },

    /// Telemetry or video requested without a running listener
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Session already closed
    #[error("Session closed")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Background thread could not be started
    #[error("Thread error: {0}")]
    Thread(String),
}

impl From<toml::de::Error> for TelloError {
    fn from(e: toml::de::Error) -> Self {
        TelloError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for TelloError {
    fn from(e: toml::ser::Error) -> Self {
        TelloError::Config(e.to_string())
    }
}

impl TelloError {
    /// Whether the caller may simply retry the operation
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TelloError::CommandTimeout { .. } | TelloError::MalformedReply { .. }
        )
    }
}
