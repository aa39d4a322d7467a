//! Frame builders for server replies and server-initiated commands.
//!
//! Every function returns a `serde_json::Value`; the session layer
//! serialises it and appends the newline delimiter.

use serde_json::{Value, json};

/// Positive `reg` acknowledgement.
#[must_use]
pub fn reg_ack(cloudtime: &str, nosenduser: bool) -> Value {
    json!({
        "ret": "reg",
        "result": true,
        "cloudtime": cloudtime,
        "nosenduser": nosenduser,
    })
}

/// Negative `reg` acknowledgement. The terminal shows `reason` on screen.
#[must_use]
pub fn reg_nack(reason: &str) -> Value {
    json!({
        "ret": "reg",
        "result": false,
        "reason": reason,
    })
}

/// Positive `sendlog` acknowledgement.
///
/// `access` is 1 when the batch was a live door event and access was
/// granted, 0 otherwise. Terminals with a relay wired to the server verdict
/// open the door on 1.
#[must_use]
pub fn sendlog_ack(count: i64, logindex: i64, cloudtime: &str, access: i64) -> Value {
    json!({
        "ret": "sendlog",
        "result": true,
        "count": count,
        "logindex": logindex,
        "cloudtime": cloudtime,
        "access": access,
    })
}

/// Negative `sendlog` acknowledgement. The terminal retains the batch and
/// retries later.
#[must_use]
pub fn sendlog_nack() -> Value {
    json!({
        "ret": "sendlog",
        "result": false,
    })
}

/// Positive `senduser` acknowledgement.
#[must_use]
pub fn senduser_ack(cloudtime: &str) -> Value {
    json!({
        "ret": "senduser",
        "result": true,
        "cloudtime": cloudtime,
    })
}

/// Negative `senduser` acknowledgement.
#[must_use]
pub fn senduser_nack() -> Value {
    json!({
        "ret": "senduser",
        "result": false,
        "reason": 1,
    })
}

/// `sendqrcode` verdict. `access` 1 grants, 0 denies; `message` is shown on
/// the terminal screen.
#[must_use]
pub fn qrcode_ack(access: i64, enrollid: i64, username: &str, message: &str) -> Value {
    json!({
        "ret": "sendqrcode",
        "result": true,
        "access": access,
        "enrollid": enrollid,
        "username": username,
        "message": message,
    })
}

/// `sendqrcode` rejection for codes the server cannot even parse.
#[must_use]
pub fn qrcode_nack() -> Value {
    json!({
        "ret": "sendqrcode",
        "result": false,
    })
}

/// Create or update a user on the terminal.
#[must_use]
pub fn setuserinfo(enrollid: i64, name: &str, backupnum: i64, admin: i64, record: &Value) -> Value {
    json!({
        "cmd": "setuserinfo",
        "enrollid": enrollid,
        "name": name,
        "backupnum": backupnum,
        "admin": admin,
        "record": record,
    })
}

/// Delete a user from the terminal. `backupnum` 13 removes every credential
/// for the enrollid.
#[must_use]
pub fn deleteuser(enrollid: i64, backupnum: Option<i64>) -> Value {
    json!({
        "cmd": "deleteuser",
        "enrollid": enrollid,
        "backupnum": backupnum.unwrap_or(13),
    })
}

/// Enable or disable a user on the terminal.
#[must_use]
pub fn enableuser(enrollid: i64, enabled: bool) -> Value {
    json!({
        "cmd": "enableuser",
        "enrollid": enrollid,
        "enflag": i64::from(enabled),
    })
}

/// Pulse the door relay for `delay` seconds.
#[must_use]
pub fn opendoor(door: i64, delay: i64) -> Value {
    json!({
        "cmd": "opendoor",
        "door": door,
        "delay": delay,
    })
}

/// Set the terminal clock.
#[must_use]
pub fn settime(cloudtime: &str) -> Value {
    json!({
        "cmd": "settime",
        "cloudtime": cloudtime,
    })
}

/// Request a page of the terminal's user list. `stn` true starts a fresh
/// enumeration.
#[must_use]
pub fn getuserlist(stn: bool) -> Value {
    json!({
        "cmd": "getuserlist",
        "stn": stn,
    })
}

/// Request unsent attendance records. `stn` true starts from the terminal's
/// internal new-log pointer.
#[must_use]
pub fn getnewlog(stn: bool) -> Value {
    json!({
        "cmd": "getnewlog",
        "stn": stn,
    })
}

/// Reboot the terminal.
#[must_use]
pub fn reboot() -> Value {
    json!({ "cmd": "reboot" })
}

/// Erase the terminal's stored attendance log.
#[must_use]
pub fn cleanlog() -> Value {
    json!({ "cmd": "cleanlog" })
}

/// Query the terminal's hardware description.
#[must_use]
pub fn getdevinfo() -> Value {
    json!({ "cmd": "getdevinfo" })
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::{Message, parse_value};

    #[test]
    fn reg_ack_shape() {
        let v = reg_ack("2025-03-01 08:00:00", true);
        assert_eq!(v["ret"], "reg");
        assert_eq!(v["result"], true);
        assert_eq!(v["cloudtime"], "2025-03-01 08:00:00");
        assert_eq!(v["nosenduser"], true);
    }

    #[test]
    fn sendlog_ack_echoes_count_and_index() {
        let v = sendlog_ack(2, 10, "2025-03-01 08:00:00", 0);
        assert_eq!(v["count"], 2);
        assert_eq!(v["logindex"], 10);
        assert_eq!(v["access"], 0);
    }

    #[test]
    fn deleteuser_defaults_to_all_credentials() {
        assert_eq!(deleteuser(7, None)["backupnum"], 13);
        assert_eq!(deleteuser(7, Some(0))["backupnum"], 0);
    }

    #[test]
    fn enableuser_maps_flag() {
        assert_eq!(enableuser(7, true)["enflag"], 1);
        assert_eq!(enableuser(7, false)["enflag"], 0);
    }

    #[test]
    fn built_commands_parse_as_unknown_device_frames() {
        // A device echoing a command back would be seen as an unknown cmd
        // frame, not a crash.
        let Message::Unknown { kind, .. } = parse_value(&opendoor(1, 5)).unwrap() else {
            panic!("expected unknown");
        };
        assert_eq!(kind, "opendoor");
    }
}
