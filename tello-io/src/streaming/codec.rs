//! Datagram decoders and reply parsers
//!
//! # Wire Formats
//!
//! Everything except video is plain UTF-8 text:
//!
//! | Stream | Example datagram | Decoded as |
//! |--------|------------------|------------|
//! | command reply | `ok`, `error`, `87`, `-2 0 179` | `String`, verbatim |
//! | telemetry | `pitch:0;roll:-1;yaw:45;bat:87;` | [`TelemetrySnapshot`] |
//!
//! Decoders never fail: a reply with invalid UTF-8 is decoded lossily, and a
//! telemetry token that is not `key:number` is skipped. Parsing a reply as a
//! number happens later, on the caller's thread, where a failure can be
//! reported as [`TelloError::MalformedReply`].

use crate::core::types::TelemetrySnapshot;
use crate::error::{Result, TelloError};

/// Decode a command reply datagram
pub fn decode_reply(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Decode a telemetry datagram (`key:value;key:value;...`)
pub fn decode_telemetry(bytes: &[u8]) -> TelemetrySnapshot {
    let text = String::from_utf8_lossy(bytes);
    text.split(';')
        .filter_map(|token| {
            let (key, rest) = token.split_once(':')?;
            // Only the text up to a second ':' is the value
            let value = rest.split(':').next()?.trim();
            match value.parse::<f64>() {
                Ok(v) => Some((key.to_string(), v)),
                Err(_) => {
                    log::trace!("Dropping telemetry token '{}'", token);
                    None
                }
            }
        })
        .collect()
}

/// Parse a query reply holding one integer
pub fn parse_int(command: &str, reply: &str) -> Result<i32> {
    reply
        .trim()
        .parse::<i32>()
        .map_err(|_| malformed(command, reply))
}

/// Parse a query reply holding whitespace-separated integers
pub fn parse_int_list(command: &str, reply: &str) -> Result<Vec<i32>> {
    let values = reply
        .split_whitespace()
        .map(|token| token.parse::<i32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| malformed(command, reply))?;

    if values.is_empty() {
        return Err(malformed(command, reply));
    }
    Ok(values)
}

fn malformed(command: &str, reply: &str) -> TelloError {
    TelloError::MalformedReply {
        command: command.to_string(),
        reply: reply.to_string(),
    }
}
