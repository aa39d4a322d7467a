//! Durable per-terminal command queue.
//!
//! Commands addressed to a terminal survive restarts and offline periods in
//! the `device_commands` table and are drained in FIFO order right after the
//! terminal registers. The queue only marks a command sent once it has been
//! written to the socket.

use serde_json::Value;

use crate::storage::{Database, DatabaseError, DeviceCommand};

/// Command kinds the daemon can push to a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    SetUserInfo,
    DeleteUser,
    EnableUser,
    OpenDoor,
    SetTime,
    GetUserList,
    GetNewLog,
    Reboot,
    CleanLog,
    GetDevInfo,
}

impl CommandKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SetUserInfo => "setuserinfo",
            Self::DeleteUser => "deleteuser",
            Self::EnableUser => "enableuser",
            Self::OpenDoor => "opendoor",
            Self::SetTime => "settime",
            Self::GetUserList => "getuserlist",
            Self::GetNewLog => "getnewlog",
            Self::Reboot => "reboot",
            Self::CleanLog => "cleanlog",
            Self::GetDevInfo => "getdevinfo",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle over the durable command queue.
#[derive(Clone)]
pub struct CommandQueue {
    db: Database,
}

impl CommandQueue {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Enqueue a command frame for a terminal. Returns the queue row ID.
    pub async fn enqueue(
        &self,
        sn: &str,
        kind: CommandKind,
        payload: &Value,
    ) -> Result<i64, DatabaseError> {
        self.db
            .enqueue_command(sn, kind.as_str(), &payload.to_string())
            .await
    }

    /// Pending commands for a terminal, oldest first.
    pub async fn drain_pending(&self, sn: &str) -> Result<Vec<DeviceCommand>, DatabaseError> {
        self.db.pending_commands(sn).await
    }

    /// Mark a command as written to the terminal socket.
    pub async fn mark_sent(&self, id: i64) -> Result<(), DatabaseError> {
        self.db.mark_command_sent(id).await
    }
}
