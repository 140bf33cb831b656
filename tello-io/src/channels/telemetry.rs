//! Latest-snapshot telemetry
//!
//! The drone broadcasts its state about ten times a second. Reads never clear
//! the mailbox, so every caller sees the most recent snapshot until the next
//! datagram replaces it.

use crate::core::{Mailbox, Stamped, TelemetrySnapshot};
use crate::error::Result;
use crate::streaming::codec::decode_telemetry;
use crate::streaming::{InboundListener, ListenerHealth};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

/// Telemetry socket and the listener decoding it
pub struct TelemetryChannel {
    snapshots: Arc<Mailbox<TelemetrySnapshot>>,
    listener: InboundListener,
    local_addr: SocketAddr,
}

impl TelemetryChannel {
    /// Bind `bind` and start decoding telemetry
    pub fn open(bind: SocketAddr, buffer_size: usize, poll_interval: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(bind)?;
        let local_addr = socket.local_addr()?;
        let snapshots = Arc::new(Mailbox::new());

        let listener = InboundListener::spawn(
            "tello-telemetry",
            socket,
            buffer_size,
            poll_interval,
            decode_telemetry,
            Arc::clone(&snapshots),
        )?;

        Ok(Self {
            snapshots,
            listener,
            local_addr,
        })
    }

    /// Last decoded snapshot; empty before the first datagram
    pub fn latest(&self) -> TelemetrySnapshot {
        self.snapshots.peek().unwrap_or_default()
    }

    /// Last snapshot with its arrival stamp, `None` until data has arrived
    pub fn latest_stamped(&self) -> Option<Stamped<TelemetrySnapshot>> {
        self.snapshots.peek_stamped()
    }

    /// Single attribute from the last snapshot
    pub fn get(&self, key: &str) -> Option<f64> {
        self.snapshots
            .peek_stamped()
            .and_then(|s| s.value.get(key).copied())
    }

    pub fn health(&self) -> ListenerHealth {
        self.listener.health()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the listener, releasing the socket (idempotent)
    pub fn close(&mut self) {
        self.listener.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    fn open_channel() -> TelemetryChannel {
        TelemetryChannel::open(
            "127.0.0.1:0".parse().unwrap(),
            1024,
            Duration::from_millis(20),
        )
        .unwrap()
    }

    fn wait_for_sequence(channel: &TelemetryChannel, sequence: u64) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if channel
                .latest_stamped()
                .is_some_and(|s| s.sequence >= sequence)
            {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_empty_before_first_datagram() {
        let channel = open_channel();
        assert!(channel.latest().is_empty());
        assert!(channel.latest_stamped().is_none());
        assert_eq!(channel.get("bat"), None);
    }

    #[test]
    fn test_latest_snapshot_replaces_previous() {
        let channel = open_channel();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

        sender
            .send_to(b"pitch:1;roll:2;bat:90;", channel.local_addr())
            .unwrap();
        assert!(wait_for_sequence(&channel, 1));

        sender.send_to(b"bat:89;h:30;", channel.local_addr()).unwrap();
        assert!(wait_for_sequence(&channel, 2));

        let snapshot = channel.latest();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["bat"], 89.0);
        assert_eq!(channel.get("h"), Some(30.0));
        assert_eq!(channel.get("pitch"), None);

        // Reads do not clear
        assert_eq!(channel.latest(), snapshot);
    }

    #[test]
    fn test_close_stops_listener() {
        let mut channel = open_channel();
        let health = channel.health();
        channel.close();
        assert!(!health.is_alive());
        UdpSocket::bind(channel.local_addr()).unwrap();
    }
}
