//! Connected drone session
//!
//! # Startup Sequence
//!
//! 1. Bind the command socket and start the reply listener
//! 2. Bind the telemetry port (if enabled)
//! 3. Handshake: `command` must be answered with `ok`
//! 4. Video (if enabled): `streamon` must be answered with `ok`, then the
//!    capture is opened and the frame pump started (if `publish_frames`)
//!
//! A failure at any step returns the error and drops everything already
//! started, so no listener outlives a failed `connect`.
//!
//! # Shutdown
//!
//! [`Session::close`] stops the frame pump, the video, telemetry and reply
//! listeners in that order and releases every socket. It is idempotent and
//! also runs on drop. Commands issued afterwards fail with
//! [`TelloError::Closed`].

use crate::channels::{
    CommandChannel, FRAME_KEY, FrameEvent, FramePump, FramePumpHandle, Reply, TelemetryChannel,
    VideoBuffer,
};
use crate::commands::{Command, FlipDirection, Query};
use crate::config::TelloConfig;
use crate::core::{Stamped, TelemetrySnapshot};
use crate::error::{Result, TelloError};
use crate::observer::{Observer, ObserverBus};
use crate::streaming::codec::{parse_int, parse_int_list};
use crate::streaming::{FrameSource, ListenerHealth, UdpFrameCapture};
use std::sync::Arc;

/// Liveness of every listener in a session
#[derive(Debug, Clone)]
pub struct SessionHealth {
    pub commands: ListenerHealth,
    pub telemetry: Option<ListenerHealth>,
    pub video: Option<ListenerHealth>,
}

impl SessionHealth {
    /// Whether every started listener is still running
    pub fn all_alive(&self) -> bool {
        self.commands.is_alive()
            && self.telemetry.as_ref().is_none_or(ListenerHealth::is_alive)
            && self.video.as_ref().is_none_or(ListenerHealth::is_alive)
    }
}

/// Connection to one drone
pub struct Session<S: FrameSource = UdpFrameCapture> {
    config: TelloConfig,
    commands: CommandChannel,
    telemetry: Option<TelemetryChannel>,
    video: Option<Arc<VideoBuffer<S::Frame>>>,
    pump: Option<FramePumpHandle>,
    observers: Arc<ObserverBus<FrameEvent<S::Frame>>>,
    closed: bool,
}

impl Session<UdpFrameCapture> {
    /// Connect using the built-in UDP capture for video
    pub fn connect(config: TelloConfig) -> Result<Self> {
        Self::connect_with_capture(config, |config| {
            UdpFrameCapture::open(
                config.bind_address(config.video.port)?,
                config.video.recv_buffer_size,
                config.poll_interval(),
            )
        })
    }
}

impl<S: FrameSource> Session<S> {
    /// Connect, opening the video capture with `open_capture` after `streamon`
    pub fn connect_with_capture<O>(config: TelloConfig, open_capture: O) -> Result<Self>
    where
        O: FnOnce(&TelloConfig) -> Result<S>,
    {
        let poll_interval = config.poll_interval();

        let commands = CommandChannel::open(
            config.bind_address(config.connection.local_port)?,
            config.drone_address()?,
            config.command_timeout(),
            config.connection.recv_buffer_size,
            poll_interval,
        )?;

        let telemetry = if config.telemetry.enabled {
            Some(TelemetryChannel::open(
                config.bind_address(config.telemetry.port)?,
                config.connection.recv_buffer_size,
                poll_interval,
            )?)
        } else {
            None
        };

        commands.expect_ok(&Command::EnterSdk.to_string())?;
        log::info!("Entered SDK mode on {}", commands.drone_address());

        let observers = Arc::new(ObserverBus::new(config.observers.queue_depth));

        let (video, pump) = if config.video.enabled {
            commands.expect_ok(&Command::StreamOn.to_string())?;
            log::info!("Video stream on");

            let capture = open_capture(&config)?;
            let buffer = Arc::new(VideoBuffer::start(capture)?);

            let pump = if config.video.publish_frames {
                Some(
                    FramePump::new(Arc::clone(&buffer), Arc::clone(&observers))
                        .spawn(poll_interval)?,
                )
            } else {
                None
            };
            (Some(buffer), pump)
        } else {
            (None, None)
        };

        Ok(Self {
            config,
            commands,
            telemetry,
            video,
            pump,
            observers,
            closed: false,
        })
    }

    pub fn config(&self) -> &TelloConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Raw commands
    // ------------------------------------------------------------------

    /// Send a catalogued command
    pub fn send(&self, command: Command, reply: Reply) -> Result<Option<String>> {
        self.send_raw(&command.to_string(), reply)
    }

    /// Send arbitrary command text
    pub fn send_raw(&self, command: &str, reply: Reply) -> Result<Option<String>> {
        if self.closed {
            return Err(TelloError::Closed);
        }
        self.commands.send(command, reply)
    }

    /// Repeat the SDK-mode handshake
    pub fn enter_command_mode(&self) -> Result<()> {
        self.ensure_open()?;
        self.commands.expect_ok(&Command::EnterSdk.to_string())
    }

    // ------------------------------------------------------------------
    // Flight control
    // ------------------------------------------------------------------

    pub fn take_off(&self, reply: Reply) -> Result<Option<String>> {
        self.send(Command::TakeOff, reply)
    }

    pub fn land(&self, reply: Reply) -> Result<Option<String>> {
        self.send(Command::Land, reply)
    }

    /// Stop all motors immediately
    pub fn emergency(&self, reply: Reply) -> Result<Option<String>> {
        self.send(Command::Emergency, reply)
    }

    /// Ask the drone to start streaming video; does not start a capture
    pub fn stream_on(&self, reply: Reply) -> Result<Option<String>> {
        self.send(Command::StreamOn, reply)
    }

    pub fn stream_off(&self, reply: Reply) -> Result<Option<String>> {
        self.send(Command::StreamOff, reply)
    }

    pub fn move_up(&self, cm: u32, reply: Reply) -> Result<Option<String>> {
        self.send(Command::Up(cm), reply)
    }

    pub fn move_down(&self, cm: u32, reply: Reply) -> Result<Option<String>> {
        self.send(Command::Down(cm), reply)
    }

    pub fn move_left(&self, cm: u32, reply: Reply) -> Result<Option<String>> {
        self.send(Command::Left(cm), reply)
    }

    pub fn move_right(&self, cm: u32, reply: Reply) -> Result<Option<String>> {
        self.send(Command::Right(cm), reply)
    }

    pub fn move_forward(&self, cm: u32, reply: Reply) -> Result<Option<String>> {
        self.send(Command::Forward(cm), reply)
    }

    pub fn move_back(&self, cm: u32, reply: Reply) -> Result<Option<String>> {
        self.send(Command::Back(cm), reply)
    }

    pub fn rotate_clockwise(&self, degrees: u32, reply: Reply) -> Result<Option<String>> {
        self.send(Command::Clockwise(degrees), reply)
    }

    pub fn rotate_counter_clockwise(&self, degrees: u32, reply: Reply) -> Result<Option<String>> {
        self.send(Command::CounterClockwise(degrees), reply)
    }

    pub fn flip(&self, direction: FlipDirection, reply: Reply) -> Result<Option<String>> {
        self.send(Command::Flip(direction), reply)
    }

    /// Fly to `[x, y, z]` cm relative to the current position
    pub fn go_to(&self, target: [i32; 3], speed: u32, reply: Reply) -> Result<Option<String>> {
        let [x, y, z] = target;
        self.send(Command::Go { x, y, z, speed }, reply)
    }

    /// Fly a curve through `via` to `target`
    pub fn curve(
        &self,
        via: [i32; 3],
        target: [i32; 3],
        speed: u32,
        reply: Reply,
    ) -> Result<Option<String>> {
        let [x1, y1, z1] = via;
        let [x2, y2, z2] = target;
        self.send(
            Command::Curve {
                x1,
                y1,
                z1,
                x2,
                y2,
                z2,
                speed,
            },
            reply,
        )
    }

    pub fn set_speed(&self, speed: u32, reply: Reply) -> Result<Option<String>> {
        self.send(Command::Speed(speed), reply)
    }

    /// Set the four remote-control channels (-100..=100 each)
    pub fn remote_control(
        &self,
        left_right: i32,
        forward_back: i32,
        up_down: i32,
        yaw: i32,
        reply: Reply,
    ) -> Result<Option<String>> {
        self.send(
            Command::Rc {
                left_right,
                forward_back,
                up_down,
                yaw,
            },
            reply,
        )
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Send `query` and parse a single integer answer
    pub fn query_int(&self, query: Query) -> Result<i32> {
        self.ensure_open()?;
        let reply = self.commands.request(query.as_str())?;
        parse_int(query.as_str(), &reply)
    }

    /// Send `query` and parse its answer as integers
    ///
    /// Vector queries (attitude, acceleration) yield every value; scalar
    /// queries yield exactly one and reject anything longer.
    pub fn query_ints(&self, query: Query) -> Result<Vec<i32>> {
        self.ensure_open()?;
        let reply = self.commands.request(query.as_str())?;
        parse_query_reply(query, &reply)
    }

    /// Speed in cm/s
    pub fn speed(&self) -> Result<i32> {
        self.query_int(Query::Speed)
    }

    /// Battery percentage
    pub fn battery(&self) -> Result<i32> {
        self.query_int(Query::Battery)
    }

    /// Flight time in seconds
    pub fn flight_time(&self) -> Result<i32> {
        self.query_int(Query::FlightTime)
    }

    /// Height above the takeoff point in dm
    pub fn height(&self) -> Result<i32> {
        self.query_int(Query::Height)
    }

    /// Barometer altitude in m
    pub fn barometer(&self) -> Result<i32> {
        self.query_int(Query::Barometer)
    }

    /// Time-of-flight sensor height in cm
    pub fn tof(&self) -> Result<i32> {
        self.query_int(Query::Tof)
    }

    pub fn temperature(&self) -> Result<i32> {
        self.query_int(Query::Temperature)
    }

    /// `[pitch, roll, yaw]` in degrees
    pub fn attitude(&self) -> Result<[i32; 3]> {
        self.query_vector(Query::Attitude)
    }

    /// `[x, y, z]` acceleration in 0.001 g
    pub fn acceleration(&self) -> Result<[i32; 3]> {
        self.query_vector(Query::Acceleration)
    }

    fn query_vector(&self, query: Query) -> Result<[i32; 3]> {
        self.ensure_open()?;
        let reply = self.commands.request(query.as_str())?;
        let values = parse_query_reply(query, &reply)?;
        <[i32; 3]>::try_from(values).map_err(|_| TelloError::MalformedReply {
            command: query.as_str().to_string(),
            reply,
        })
    }

    // ------------------------------------------------------------------
    // Telemetry and video
    // ------------------------------------------------------------------

    /// Latest telemetry snapshot (empty before the first datagram)
    pub fn state(&self) -> Result<TelemetrySnapshot> {
        Ok(self.telemetry_channel()?.latest())
    }

    /// Latest telemetry snapshot with its arrival stamp
    pub fn state_stamped(&self) -> Result<Option<Stamped<TelemetrySnapshot>>> {
        Ok(self.telemetry_channel()?.latest_stamped())
    }

    pub fn telemetry(&self) -> Option<&TelemetryChannel> {
        self.telemetry.as_ref()
    }

    /// Block until a frame is available and take it
    ///
    /// Competes with the frame pump when `publish_frames` is on; use
    /// observers instead in that case.
    pub fn read_frame(&self) -> Result<S::Frame> {
        Ok(self.video_buffer()?.read())
    }

    pub fn video(&self) -> Option<&VideoBuffer<S::Frame>> {
        self.video.as_deref()
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Register `observer` for `key`
    pub fn subscribe<O>(&self, key: &str, observer: O) -> Result<()>
    where
        O: Observer<FrameEvent<S::Frame>>,
    {
        self.observers.register(key, observer)
    }

    /// Register `observer` for published video frames
    pub fn subscribe_frames<O>(&self, observer: O) -> Result<()>
    where
        O: Observer<FrameEvent<S::Frame>>,
    {
        self.subscribe(FRAME_KEY, observer)
    }

    pub fn observers(&self) -> &ObserverBus<FrameEvent<S::Frame>> {
        &self.observers
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn health(&self) -> SessionHealth {
        SessionHealth {
            commands: self.commands.health(),
            telemetry: self.telemetry.as_ref().map(TelemetryChannel::health),
            video: self.video.as_ref().and_then(|v| v.health()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop every background thread and release all sockets (idempotent)
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(mut pump) = self.pump.take() {
            pump.stop();
        }
        if let Some(video) = &self.video {
            video.close();
        }
        if let Some(telemetry) = self.telemetry.as_mut() {
            telemetry.close();
        }
        self.commands.close();

        log::info!("Session closed");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(TelloError::Closed);
        }
        Ok(())
    }

    fn telemetry_channel(&self) -> Result<&TelemetryChannel> {
        self.ensure_open()?;
        self.telemetry.as_ref().ok_or_else(|| {
            TelloError::TransportUnavailable("telemetry is not enabled".to_string())
        })
    }

    fn video_buffer(&self) -> Result<&VideoBuffer<S::Frame>> {
        self.ensure_open()?;
        self.video
            .as_deref()
            .ok_or_else(|| TelloError::TransportUnavailable("video is not enabled".to_string()))
    }
}

fn parse_query_reply(query: Query, reply: &str) -> Result<Vec<i32>> {
    if query.is_vector() {
        parse_int_list(query.as_str(), reply)
    } else {
        parse_int(query.as_str(), reply).map(|value| vec![value])
    }
}

impl<S: FrameSource> Drop for Session<S> {
    fn drop(&mut self) {
        self.close();
    }
}
