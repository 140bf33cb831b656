//! Text commands understood by the drone
//!
//! Each variant renders (via `Display`) to the exact datagram payload. Range
//! limits are documented on the variants but not enforced here; the drone
//! answers `error` for out-of-range arguments.

use std::fmt;

/// Flip direction for [`Command::Flip`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDirection {
    Left,
    Right,
    Forward,
    Back,
}

impl FlipDirection {
    fn code(self) -> char {
        match self {
            FlipDirection::Left => 'l',
            FlipDirection::Right => 'r',
            FlipDirection::Forward => 'f',
            FlipDirection::Back => 'b',
        }
    }
}

/// Commands to the drone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Enter SDK mode; must be acknowledged with `ok` before anything else
    EnterSdk,
    TakeOff,
    Land,
    StreamOn,
    StreamOff,
    /// Stop all motors immediately
    Emergency,

    /// Relative movement in cm, 20..=500
    Up(u32),
    Down(u32),
    Left(u32),
    Right(u32),
    Forward(u32),
    Back(u32),

    /// Rotation in degrees, 1..=3600
    Clockwise(u32),
    CounterClockwise(u32),

    Flip(FlipDirection),

    /// Fly to (x, y, z) cm relative to the current position at `speed` cm/s (10..=100)
    Go { x: i32, y: i32, z: i32, speed: u32 },

    /// Fly a curve through (x1, y1, z1) to (x2, y2, z2), coordinates -500..=500,
    /// `speed` 10..=60 cm/s
    Curve {
        x1: i32,
        y1: i32,
        z1: i32,
        x2: i32,
        y2: i32,
        z2: i32,
        speed: u32,
    },

    /// Set speed in cm/s, 10..=100
    Speed(u32),

    /// Remote-control channels, each -100..=100
    Rc {
        left_right: i32,
        forward_back: i32,
        up_down: i32,
        yaw: i32,
    },

    Query(Query),
}

/// Read-only queries answered with numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// cm/s, 10..=100
    Speed,
    /// Percent, 0..=100
    Battery,
    /// Flight time in seconds
    FlightTime,
    /// Height above takeoff point, dm
    Height,
    /// Temperature, 0..=90 C
    Temperature,
    /// pitch roll yaw, degrees
    Attitude,
    /// Barometer altitude, m
    Barometer,
    /// Acceleration x y z, 0.001 g
    Acceleration,
    /// Time-of-flight height, cm, 10..=400 (6553 when out of range)
    Tof,
}

impl Query {
    pub fn as_str(self) -> &'static str {
        match self {
            Query::Speed => "speed?",
            Query::Battery => "battery?",
            Query::FlightTime => "time?",
            Query::Height => "height?",
            Query::Temperature => "temp?",
            Query::Attitude => "attitude?",
            Query::Barometer => "baro?",
            Query::Acceleration => "acceleration?",
            Query::Tof => "tof?",
        }
    }

    /// Whether the answer is a space-separated list
    pub fn is_vector(self) -> bool {
        matches!(self, Query::Attitude | Query::Acceleration)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Command::EnterSdk => f.write_str("command"),
            Command::TakeOff => f.write_str("takeoff"),
            Command::Land => f.write_str("land"),
            Command::StreamOn => f.write_str("streamon"),
            Command::StreamOff => f.write_str("streamoff"),
            Command::Emergency => f.write_str("emergency"),
            Command::Up(cm) => write!(f, "up {}", cm),
            Command::Down(cm) => write!(f, "down {}", cm),
            Command::Left(cm) => write!(f, "left {}", cm),
            Command::Right(cm) => write!(f, "right {}", cm),
            Command::Forward(cm) => write!(f, "forward {}", cm),
            Command::Back(cm) => write!(f, "back {}", cm),
            Command::Clockwise(deg) => write!(f, "cw {}", deg),
            Command::CounterClockwise(deg) => write!(f, "ccw {}", deg),
            Command::Flip(dir) => write!(f, "flip {}", dir.code()),
            Command::Go { x, y, z, speed } => write!(f, "go {} {} {} {}", x, y, z, speed),
            Command::Curve {
                x1,
                y1,
                z1,
                x2,
                y2,
                z2,
                speed,
            } => write!(
                f,
                "curve {} {} {} {} {} {} {}",
                x1, y1, z1, x2, y2, z2, speed
            ),
            Command::Speed(speed) => write!(f, "speed {}", speed),
            Command::Rc {
                left_right,
                forward_back,
                up_down,
                yaw,
            } => write!(
                f,
                "rc {} {} {} {}",
                left_right, forward_back, up_down, yaw
            ),
            Command::Query(query) => query.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_commands() {
        assert_eq!(Command::EnterSdk.to_string(), "command");
        assert_eq!(Command::TakeOff.to_string(), "takeoff");
        assert_eq!(Command::StreamOn.to_string(), "streamon");
        assert_eq!(Command::Emergency.to_string(), "emergency");
    }

    #[test]
    fn test_movement_commands() {
        assert_eq!(Command::Up(50).to_string(), "up 50");
        assert_eq!(Command::Back(20).to_string(), "back 20");
        assert_eq!(Command::CounterClockwise(90).to_string(), "ccw 90");
        assert_eq!(
            Command::Flip(FlipDirection::Forward).to_string(),
            "flip f"
        );
    }

    #[test]
    fn test_compound_commands() {
        let go = Command::Go {
            x: 100,
            y: -50,
            z: 20,
            speed: 60,
        };
        assert_eq!(go.to_string(), "go 100 -50 20 60");

        let curve = Command::Curve {
            x1: 20,
            y1: 20,
            z1: 0,
            x2: 60,
            y2: 40,
            z2: 0,
            speed: 30,
        };
        assert_eq!(curve.to_string(), "curve 20 20 0 60 40 0 30");

        let rc = Command::Rc {
            left_right: -10,
            forward_back: 0,
            up_down: 25,
            yaw: 100,
        };
        assert_eq!(rc.to_string(), "rc -10 0 25 100");
    }

    #[test]
    fn test_queries() {
        assert_eq!(Command::Query(Query::Battery).to_string(), "battery?");
        assert_eq!(Query::FlightTime.to_string(), "time?");
        assert!(Query::Attitude.is_vector());
        assert!(Query::Acceleration.is_vector());
        assert!(!Query::Tof.is_vector());
    }
}
