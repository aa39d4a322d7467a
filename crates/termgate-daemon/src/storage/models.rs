//! Data models for termgate storage.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Terminal {
    pub id: i64,
    pub sn: String,
    pub cpusn: Option<String>,
    pub model: String,
    pub firmware: String,
    pub mac_address: String,
    pub user_capacity: i64,
    pub fp_capacity: i64,
    pub log_capacity: i64,
    pub users_used: i64,
    pub fp_used: i64,
    pub logs_used: i64,
    pub is_active: i64,
    pub is_whitelisted: i64,
    pub last_seen: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BiometricUser {
    pub id: i64,
    pub sn: String,
    pub enrollid: i64,
    pub name: String,
    pub admin: i64,
    pub is_enabled: i64,
    pub valid_from: Option<i64>,
    pub valid_until: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttendanceLog {
    pub id: i64,
    pub sn: String,
    pub enrollid: i64,
    pub event_time: String,
    pub mode: i64,
    pub inout: i64,
    pub event: i64,
    pub temperature: Option<f64>,
    pub verify_mode: Option<i64>,
    pub access_granted: i64,
    pub sync_status: String,
    pub sync_attempts: i64,
    pub sync_error: Option<String>,
    pub next_attempt_at: i64,
    pub synced_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceCommand {
    pub id: i64,
    pub sn: String,
    pub command: String,
    pub payload: String,
    pub status: String,
    pub created_at: i64,
    pub sent_at: Option<i64>,
}

/// Delivery state of an attendance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Never attempted.
    Pending,
    /// Delivered upstream.
    Sent,
    /// Failed at least once, still eligible for retry.
    Failed,
    /// Exhausted retries or hit a permanent rejection.
    Dead,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a queued device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Pending,
    Sent,
}

impl CommandStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
        }
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
