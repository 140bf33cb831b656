//! In-process simulated drone for integration tests
//!
//! Binds an ephemeral UDP port on 127.0.0.1 and answers each command on the
//! socket it came from, like the real drone does on 8889:
//!
//! - scripted reply for the exact command text, if one was set
//! - no reply at all for commands marked silent
//! - `ok` otherwise
//!
//! A reply can also be scheduled to leave after a delay, to reproduce answers
//! that arrive after the client gave up waiting.

#![allow(dead_code)]

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tello_io::{FrameSource, TelloConfig};

pub const TIMEOUT: Duration = Duration::from_millis(300);
pub const WAIT: Duration = Duration::from_secs(2);

/// Install a test logger once (`RUST_LOG=debug cargo test` to see output)
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct SimulatedDrone {
    addr: SocketAddr,
    script: Arc<Mutex<HashMap<String, Option<String>>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    received: Arc<Mutex<Vec<String>>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedDrone {
    pub fn start() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let addr = socket.local_addr().unwrap();

        let script: Arc<Mutex<HashMap<String, Option<String>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let delays: Arc<Mutex<HashMap<String, Duration>>> = Arc::new(Mutex::new(HashMap::new()));
        let received = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_script = Arc::clone(&script);
        let thread_delays = Arc::clone(&delays);
        let thread_received = Arc::clone(&received);
        let thread_shutdown = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("simulated-drone".to_string())
            .spawn(move || {
                let mut buffer = [0u8; 1024];
                while !thread_shutdown.load(Ordering::Relaxed) {
                    let Ok((len, from)) = socket.recv_from(&mut buffer) else {
                        continue;
                    };
                    let command = String::from_utf8_lossy(&buffer[..len]).into_owned();
                    thread_received.lock().push(command.clone());

                    let reply = match thread_script.lock().get(&command) {
                        Some(scripted) => scripted.clone(),
                        None => Some("ok".to_string()),
                    };
                    let delay = thread_delays.lock().get(&command).copied();
                    match (reply, delay) {
                        (Some(reply), Some(delay)) => {
                            let Ok(late) = socket.try_clone() else {
                                continue;
                            };
                            thread::spawn(move || {
                                thread::sleep(delay);
                                let _ = late.send_to(reply.as_bytes(), from);
                            });
                        }
                        (Some(reply), None) => {
                            let _ = socket.send_to(reply.as_bytes(), from);
                        }
                        (None, _) => {}
                    }
                }
            })
            .unwrap();

        Self {
            addr,
            script,
            delays,
            received,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Answer `command` with `reply` from now on
    pub fn reply_to(&self, command: &str, reply: &str) {
        self.script
            .lock()
            .insert(command.to_string(), Some(reply.to_string()));
    }

    /// Answer `command` with `reply`, but only after `delay`
    pub fn reply_late(&self, command: &str, reply: &str, delay: Duration) {
        self.reply_to(command, reply);
        self.delays.lock().insert(command.to_string(), delay);
    }

    /// Never answer `command`
    pub fn silence(&self, command: &str) {
        self.script.lock().insert(command.to_string(), None);
    }

    /// Commands received so far, in arrival order
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Wait until `command` has been received
    pub fn wait_for_command(&self, command: &str) -> bool {
        wait_until(|| self.received.lock().iter().any(|c| c == command))
    }

    /// Session configuration pointing at this drone, telemetry and video off
    pub fn config(&self) -> TelloConfig {
        let mut config = TelloConfig::default();
        config.connection.drone_ip = self.addr.ip().to_string();
        config.connection.command_port = self.addr.port();
        config.connection.bind_ip = "127.0.0.1".to_string();
        config.connection.local_port = 0;
        config.connection.command_timeout_ms = TIMEOUT.as_millis() as u64;
        config.connection.poll_interval_ms = 20;
        config.telemetry.enabled = false;
        config.telemetry.port = 0;
        config.video.enabled = false;
        config.video.port = 0;
        config
    }
}

impl Drop for SimulatedDrone {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Poll `condition` until it holds or [`WAIT`] passes
pub fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Frame source fed from a channel; closes when the sender is dropped
pub struct ChannelCapture {
    frames: Receiver<u32>,
    open: bool,
    released: Arc<AtomicBool>,
}

impl ChannelCapture {
    pub fn new() -> (Self, Sender<u32>, Arc<AtomicBool>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let released = Arc::new(AtomicBool::new(false));
        let capture = Self {
            frames: rx,
            open: true,
            released: Arc::clone(&released),
        };
        (capture, tx, released)
    }
}

impl FrameSource for ChannelCapture {
    type Frame = u32;

    fn is_open(&self) -> bool {
        self.open
    }

    fn read_frame(&mut self) -> Option<u32> {
        match self.frames.recv_timeout(Duration::from_millis(20)) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.open = false;
                None
            }
        }
    }

    fn release(&mut self) {
        self.open = false;
        self.released.store(true, Ordering::SeqCst);
    }
}
