//! Frame parsing.
//!
//! Terminals in the field are not strict about optional fields, so parsing
//! is tolerant: unknown keys are ignored, optional fields fall back to
//! defaults, and only the fields a message kind cannot work without are
//! required.

use serde_json::Value;

use super::types::{
    DeviceInfo, DeviceResponse, LogRecord, Message, QrCodeMessage, RegisterMessage,
    SendLogMessage, SendUserMessage,
};
use crate::error::{Error, Result};

/// Parse a single newline-delimited frame.
pub fn parse_line(line: &str) -> Result<Message> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| Error::MalformedFrame(format!("invalid JSON: {e}")))?;
    parse_value(&value)
}

/// Parse an already-decoded JSON value into a protocol message.
pub fn parse_value(value: &Value) -> Result<Message> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::MalformedFrame("frame is not a JSON object".into()))?;

    if let Some(cmd) = obj.get("cmd").and_then(Value::as_str) {
        return parse_command(cmd, value);
    }

    if let Some(ret) = obj.get("ret").and_then(Value::as_str) {
        return Ok(Message::Response(DeviceResponse {
            ret: ret.to_owned(),
            result: obj.get("result").and_then(Value::as_bool).unwrap_or(false),
            payload: value.clone(),
        }));
    }

    Err(Error::MalformedFrame(
        "frame has neither 'cmd' nor 'ret'".into(),
    ))
}

fn parse_command(cmd: &str, value: &Value) -> Result<Message> {
    match cmd {
        "reg" => parse_reg(value),
        "sendlog" => parse_sendlog(value),
        "senduser" => parse_senduser(value),
        "sendqrcode" => parse_qrcode(value),
        other => Ok(Message::Unknown {
            kind: other.to_owned(),
            payload: value.clone(),
        }),
    }
}

fn req_str(value: &Value, field: &'static str) -> Result<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or(Error::MissingField(field))
}

fn req_i64(value: &Value, field: &'static str) -> Result<i64> {
    value
        .get(field)
        .and_then(Value::as_i64)
        .ok_or(Error::MissingField(field))
}

fn opt_i64(value: &Value, field: &str, default: i64) -> i64 {
    value.get(field).and_then(Value::as_i64).unwrap_or(default)
}

fn parse_reg(value: &Value) -> Result<Message> {
    let sn = req_str(value, "sn")?;
    let cpusn = value
        .get("cpusn")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);

    let devinfo = value.get("devinfo").map_or_else(DeviceInfo::default, |d| {
        let defaults = DeviceInfo::default();
        DeviceInfo {
            modelname: d
                .get("modelname")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            firmware: d
                .get("firmware")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            mac: d
                .get("mac")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            fpalgo: d
                .get("fpalgo")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            time: d
                .get("time")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            usersize: opt_i64(d, "usersize", defaults.usersize),
            fpsize: opt_i64(d, "fpsize", defaults.fpsize),
            logsize: opt_i64(d, "logsize", defaults.logsize),
            useduser: opt_i64(d, "useduser", 0),
            usedfp: opt_i64(d, "usedfp", 0),
            usedlog: opt_i64(d, "usedlog", 0),
        }
    });

    Ok(Message::Reg(RegisterMessage { sn, cpusn, devinfo }))
}

fn parse_sendlog(value: &Value) -> Result<Message> {
    let sn = req_str(value, "sn")?;
    let count = req_i64(value, "count")?;
    let logindex = opt_i64(value, "logindex", 0);

    let raw = value
        .get("record")
        .and_then(Value::as_array)
        .ok_or(Error::MissingField("record"))?;

    let mut records = Vec::with_capacity(raw.len());
    for entry in raw {
        records.push(parse_log_record(entry)?);
    }

    Ok(Message::SendLog(SendLogMessage {
        sn,
        count,
        logindex,
        records,
    }))
}

fn parse_log_record(entry: &Value) -> Result<LogRecord> {
    Ok(LogRecord {
        enrollid: req_i64(entry, "enrollid")?,
        time: req_str(entry, "time")?,
        mode: opt_i64(entry, "mode", 0),
        inout: opt_i64(entry, "inout", 0),
        event: opt_i64(entry, "event", 0),
        temp: entry.get("temp").and_then(Value::as_f64),
        verifymode: entry.get("verifymode").and_then(Value::as_i64),
        image: entry
            .get("image")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned),
    })
}

fn parse_senduser(value: &Value) -> Result<Message> {
    Ok(Message::SendUser(SendUserMessage {
        enrollid: req_i64(value, "enrollid")?,
        name: value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        backupnum: req_i64(value, "backupnum")?,
        admin: opt_i64(value, "admin", 0),
        record: value.get("record").cloned(),
    }))
}

fn parse_qrcode(value: &Value) -> Result<Message> {
    Ok(Message::SendQrCode(QrCodeMessage {
        sn: req_str(value, "sn")?,
        record: req_str(value, "record")?,
    }))
}
