//! Protocol message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded device-to-server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `reg` - terminal announces itself after connecting.
    Reg(RegisterMessage),
    /// `sendlog` - batch of attendance records.
    SendLog(SendLogMessage),
    /// `senduser` - enrollment data pushed from the terminal.
    SendUser(SendUserMessage),
    /// `sendqrcode` - QR code scanned at the terminal, needs a verdict.
    SendQrCode(QrCodeMessage),
    /// Reply to a server-initiated command (`ret` frame).
    Response(DeviceResponse),
    /// A `cmd` frame the server does not handle.
    Unknown { kind: String, payload: Value },
}

impl Message {
    /// Wire name of the command or reply, for logging.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Reg(_) => "reg",
            Self::SendLog(_) => "sendlog",
            Self::SendUser(_) => "senduser",
            Self::SendQrCode(_) => "sendqrcode",
            Self::Response(r) => &r.ret,
            Self::Unknown { kind, .. } => kind,
        }
    }
}

/// Hardware description reported in the `reg` frame's `devinfo` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub modelname: String,
    pub firmware: String,
    pub mac: String,
    /// Fingerprint algorithm version string.
    pub fpalgo: String,
    /// Clock reading the terminal reported at registration.
    pub time: String,
    pub usersize: i64,
    pub fpsize: i64,
    pub logsize: i64,
    pub useduser: i64,
    pub usedfp: i64,
    pub usedlog: i64,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            modelname: String::new(),
            firmware: String::new(),
            mac: String::new(),
            fpalgo: String::new(),
            time: String::new(),
            usersize: 3000,
            fpsize: 3000,
            logsize: 100_000,
            useduser: 0,
            usedfp: 0,
            usedlog: 0,
        }
    }
}

/// `reg` frame body.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterMessage {
    pub sn: String,
    pub cpusn: Option<String>,
    pub devinfo: DeviceInfo,
}

/// One attendance record inside a `sendlog` batch.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub enrollid: i64,
    pub time: String,
    pub mode: i64,
    pub inout: i64,
    pub event: i64,
    pub temp: Option<f64>,
    pub verifymode: Option<i64>,
    pub image: Option<String>,
}

/// `sendlog` frame body.
#[derive(Debug, Clone, PartialEq)]
pub struct SendLogMessage {
    pub sn: String,
    pub count: i64,
    pub logindex: i64,
    pub records: Vec<LogRecord>,
}

/// `senduser` frame body.
#[derive(Debug, Clone, PartialEq)]
pub struct SendUserMessage {
    pub enrollid: i64,
    pub name: String,
    pub backupnum: i64,
    pub admin: i64,
    pub record: Option<Value>,
}

/// `sendqrcode` frame body.
#[derive(Debug, Clone, PartialEq)]
pub struct QrCodeMessage {
    pub sn: String,
    pub record: String,
}

/// Reply to a server-initiated command.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceResponse {
    /// Echoed command name.
    pub ret: String,
    pub result: bool,
    /// Full frame, for handlers that need reply-specific fields.
    pub payload: Value,
}
