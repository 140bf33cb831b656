//! Command/response over UDP
//!
//! The drone answers every command on the socket the command came from, with
//! no correlation identifier. The channel therefore treats whatever lands in
//! the reply mailbox as the answer to the command most recently sent:
//!
//! ```text
//! send("battery?") ──► drone ──► "87" ──► reply mailbox ──► Some("87")
//! ```
//!
//! # Precondition: one command at a time
//!
//! A reply that arrives after its command timed out stays in the mailbox and
//! is returned to the *next* `send`. Concurrent `send` calls are serialized by
//! an internal lock, which keeps two waits from racing for the same slot but
//! cannot tell a late reply from a fresh one. Callers must not pipeline
//! commands.

use crate::core::Mailbox;
use crate::error::{Result, TelloError};
use crate::streaming::codec::decode_reply;
use crate::streaming::{InboundListener, ListenerHealth};
use parking_lot::Mutex;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Whether a command waits for the drone's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reply {
    /// Block until a reply arrives or the command timeout expires
    #[default]
    Wait,
    /// Return as soon as the datagram is sent
    FireAndForget,
}

/// Command socket plus the listener collecting its replies
pub struct CommandChannel {
    socket: Option<UdpSocket>,
    drone: SocketAddr,
    timeout: Duration,
    replies: Arc<Mailbox<String>>,
    listener: InboundListener,
    send_lock: Mutex<()>,
}

impl CommandChannel {
    /// Bind `bind` and start the reply listener
    pub fn open(
        bind: SocketAddr,
        drone: SocketAddr,
        timeout: Duration,
        buffer_size: usize,
        poll_interval: Duration,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(bind)?;
        let receiver = socket.try_clone()?;
        let replies = Arc::new(Mailbox::new());

        let listener = InboundListener::spawn(
            "tello-replies",
            receiver,
            buffer_size,
            poll_interval,
            decode_reply,
            Arc::clone(&replies),
        )?;

        log::info!(
            "Command channel bound to {}, drone at {}",
            socket.local_addr()?,
            drone
        );

        Ok(Self {
            socket: Some(socket),
            drone,
            timeout,
            replies,
            listener,
            send_lock: Mutex::new(()),
        })
    }

    /// Send `command`; with [`Reply::Wait`] block for the reply
    ///
    /// The timeout is measured from the moment the datagram leaves. Returns
    /// `None` for [`Reply::FireAndForget`].
    pub fn send(&self, command: &str, reply: Reply) -> Result<Option<String>> {
        let socket = self.socket.as_ref().ok_or(TelloError::Closed)?;
        let _guard = self.send_lock.lock();

        socket.send_to(command.as_bytes(), self.drone)?;
        let sent_at = Instant::now();
        log::debug!("TX '{}'", command);

        if reply == Reply::FireAndForget {
            return Ok(None);
        }

        match self.replies.take_until(sent_at + self.timeout) {
            Some(stamped) => {
                if stamped.received_at < sent_at {
                    log::warn!(
                        "Reply '{}' to '{}' arrived before the command was sent (late reply to an earlier command?)",
                        stamped.value.trim(),
                        command
                    );
                }
                log::debug!("RX '{}' for '{}'", stamped.value.trim(), command);
                Ok(Some(stamped.value))
            }
            None => {
                let health = self.listener.health();
                if !health.is_alive() {
                    log::warn!(
                        "Reply listener is not running ({}), '{}' cannot be answered",
                        health.last_error().unwrap_or_else(|| "stopped".to_string()),
                        command
                    );
                }
                Err(TelloError::CommandTimeout {
                    command: command.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Send `command` and wait for its reply
    pub fn request(&self, command: &str) -> Result<String> {
        self.send(command, Reply::Wait)?
            .ok_or_else(|| TelloError::CommandTimeout {
                command: command.to_string(),
                timeout: self.timeout,
            })
    }

    /// Send `command` and require the literal reply `ok`
    ///
    /// The comparison is exact: `ok\r\n` or ` ok` is a rejection.
    pub fn expect_ok(&self, command: &str) -> Result<()> {
        let reply = self.request(command)?;
        if reply != "ok" {
            return Err(TelloError::HandshakeRejected {
                command: command.to_string(),
                reply,
            });
        }
        Ok(())
    }

    /// Local address replies are received on, `None` once closed
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    pub fn drone_address(&self) -> SocketAddr {
        self.drone
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn health(&self) -> ListenerHealth {
        self.listener.health()
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    /// Stop the reply listener and release the socket (idempotent)
    pub fn close(&mut self) {
        self.listener.stop();
        if self.socket.take().is_some() {
            log::info!("Command channel closed");
        }
    }
}

impl Drop for CommandChannel {
    fn drop(&mut self) {
        self.close();
    }
}
