//! Delivery types and the target abstraction.

use serde::Serialize;

use crate::storage::AttendanceLog;

/// Wire shape of one attendance record as delivered upstream.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRecord {
    pub log_id: i64,
    pub terminal_sn: String,
    pub enrollid: i64,
    pub timestamp: String,
    pub mode: i64,
    pub inout: i64,
    pub event: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    pub access_granted: bool,
}

impl From<&AttendanceLog> for AttendanceRecord {
    fn from(log: &AttendanceLog) -> Self {
        Self {
            log_id: log.id,
            terminal_sn: log.sn.clone(),
            enrollid: log.enrollid,
            timestamp: log.event_time.clone(),
            mode: log.mode,
            inout: log.inout,
            event: log.event,
            temperature: log.temperature,
            access_granted: log.access_granted == 1,
        }
    }
}

/// Outcome counters for one delivery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub sent: u64,
    pub failed: u64,
    pub dead: u64,
}

/// Delivery failure classification.
///
/// Transient failures (network errors, 5xx) are retried with backoff;
/// permanent ones (4xx) dead-letter the batch immediately, since retrying
/// a rejected payload cannot succeed.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("transient delivery failure: {0}")]
    Transient(String),

    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
}

/// Anything that can receive a batch of attendance records.
pub trait DeliveryTarget: Send + Sync {
    fn deliver(
        &self,
        batch: &[AttendanceRecord],
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}
