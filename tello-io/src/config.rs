//! Configuration loading for TelloIO
//!
//! Every field has a default matching the drone's factory network layout, so
//! an empty TOML file (or `TelloConfig::default()`) connects to a stock Tello
//! in AP mode.

use crate::error::{Result, TelloError};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TelloConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub observers: ObserverConfig,
}

/// Command socket settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Drone IP address (default: 192.168.10.1)
    #[serde(default = "default_drone_ip")]
    pub drone_ip: String,

    /// Drone command port (default: 8889)
    #[serde(default = "default_command_port")]
    pub command_port: u16,

    /// Local interface for every socket (default: 0.0.0.0)
    #[serde(default = "default_bind_ip")]
    pub bind_ip: String,

    /// Local port receiving command replies (default: 9999, 0 = ephemeral)
    #[serde(default = "default_local_port")]
    pub local_port: u16,

    /// Reply timeout in milliseconds (default: 350)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// Receive buffer for replies in bytes (default: 1024)
    #[serde(default = "default_recv_buffer")]
    pub recv_buffer_size: usize,

    /// Listener read timeout in milliseconds, bounds shutdown latency (default: 100)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

/// Telemetry (state) stream settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Receive telemetry at all (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Local port the drone broadcasts state to (default: 8890)
    #[serde(default = "default_telemetry_port")]
    pub port: u16,
}

/// Video stream settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VideoConfig {
    /// Send `streamon` and open the capture (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Local port the drone streams video to (default: 11111)
    #[serde(default = "default_video_port")]
    pub port: u16,

    /// Receive buffer for video datagrams in bytes (default: 2048)
    #[serde(default = "default_video_buffer")]
    pub recv_buffer_size: usize,

    /// Republish frames on the observer bus under `"frame"` (default: true)
    #[serde(default = "default_true")]
    pub publish_frames: bool,
}

/// Observer bus settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ObserverConfig {
    /// Pending notifications per observer before new ones are dropped (default: 4)
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            drone_ip: default_drone_ip(),
            command_port: default_command_port(),
            bind_ip: default_bind_ip(),
            local_port: default_local_port(),
            command_timeout_ms: default_command_timeout(),
            recv_buffer_size: default_recv_buffer(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_telemetry_port(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_video_port(),
            recv_buffer_size: default_video_buffer(),
            publish_frames: true,
        }
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
        }
    }
}

// Default value functions
fn default_drone_ip() -> String {
    "192.168.10.1".to_string()
}
fn default_command_port() -> u16 {
    8889
}
fn default_bind_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_local_port() -> u16 {
    9999
}
fn default_command_timeout() -> u64 {
    350
}
fn default_recv_buffer() -> usize {
    1024
}
fn default_poll_interval() -> u64 {
    100
}
fn default_true() -> bool {
    true
}
fn default_telemetry_port() -> u16 {
    8890
}
fn default_video_port() -> u16 {
    11111
}
fn default_video_buffer() -> usize {
    2048
}
fn default_queue_depth() -> usize {
    4
}

impl TelloConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TelloError::Config(format!("Failed to read config file: {}", e)))?;
        let config: TelloConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Drone command endpoint
    pub fn drone_address(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.connection.drone_ip.parse().map_err(|e| {
            TelloError::Config(format!(
                "Invalid drone address '{}': {}",
                self.connection.drone_ip, e
            ))
        })?;
        Ok(SocketAddr::new(ip, self.connection.command_port))
    }

    /// Local address for a socket on `port`
    pub fn bind_address(&self, port: u16) -> Result<SocketAddr> {
        let ip: IpAddr = self.connection.bind_ip.parse().map_err(|e| {
            TelloError::Config(format!(
                "Invalid bind address '{}': {}",
                self.connection.bind_ip, e
            ))
        })?;
        Ok(SocketAddr::new(ip, port))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.command_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero read timeout is rejected by the OS
        Duration::from_millis(self.connection.poll_interval_ms.max(1))
    }
}
