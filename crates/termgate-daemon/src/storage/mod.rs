//! SQLite persistence for the termgate daemon.

mod db;
mod models;
mod queries;

pub use db::Database;
pub use models::{
    AttendanceLog, BiometricUser, CommandStatus, DeviceCommand, SyncStatus, Terminal,
};
pub use queries::SyncStats;
pub use termgate_core::db::DatabaseError;
