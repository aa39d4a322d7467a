//! TM20-family terminal wire protocol.
//!
//! Terminals speak newline-delimited JSON over a persistent TCP socket.
//! Device-initiated frames carry a `cmd` key, server replies echo the
//! command name under `ret`, and server-initiated commands are plain `cmd`
//! objects pushed down the same socket.

pub mod build;
mod parser;
mod types;

use chrono::{Local, NaiveDateTime};

pub use parser::{parse_line, parse_value};
pub use types::{
    DeviceInfo, DeviceResponse, LogRecord, Message, QrCodeMessage, RegisterMessage,
    SendLogMessage, SendUserMessage,
};

/// Timestamp format used on the wire (`cloudtime`, log record times).
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a wire timestamp string into a naive local datetime.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).ok()
}

/// Current local time formatted for the wire.
#[must_use]
pub fn cloudtime_now() -> String {
    Local::now().format(DATETIME_FORMAT).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn datetime_round_trip() {
        let dt = parse_datetime("2025-03-01 08:15:30").unwrap();
        assert_eq!(dt.format(DATETIME_FORMAT).to_string(), "2025-03-01 08:15:30");
    }

    #[test]
    fn bad_datetime_rejected() {
        assert!(parse_datetime("2025/03/01 08:15").is_none());
        assert!(parse_datetime("").is_none());
    }

    #[test]
    fn cloudtime_has_wire_shape() {
        let now = cloudtime_now();
        assert!(parse_datetime(&now).is_some());
    }
}
