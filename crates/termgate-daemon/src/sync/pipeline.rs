//! Batch delivery pass over stored attendance.

use std::time::Duration;

use tracing::{info, warn};

use termgate_core::db::unix_timestamp;

use super::backoff::backoff_delay;
use super::types::{AttendanceRecord, DeliveryTarget, SyncReport};
use crate::storage::{Database, DatabaseError};

/// Sync pipeline knobs.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Records per delivery attempt.
    pub batch_size: i64,
    /// Attempt budget before a record dead-letters.
    pub max_attempts: i64,
    /// First retry delay.
    pub backoff_base: Duration,
    /// Retry delay ceiling.
    pub backoff_cap: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_attempts: 5,
            backoff_base: Duration::from_secs(60),
            backoff_cap: Duration::from_secs(3600),
        }
    }
}

/// Drains eligible attendance records toward a delivery target.
pub struct SyncPipeline<T: DeliveryTarget> {
    db: Database,
    target: T,
    config: SyncConfig,
}

impl<T: DeliveryTarget> SyncPipeline<T> {
    pub fn new(db: Database, target: T, config: SyncConfig) -> Self {
        Self { db, target, config }
    }

    /// Run one delivery pass.
    ///
    /// One batch, one delivery attempt. A failed attempt books the failure
    /// per record and returns a report, never an error: delivery trouble is
    /// retried by the schedule, not bubbled up to the caller's loop.
    pub async fn run_once(&self) -> Result<SyncReport, DatabaseError> {
        let now = unix_timestamp();
        let batch = self
            .db
            .fetch_sync_batch(self.config.batch_size, self.config.max_attempts, now)
            .await?;

        if batch.is_empty() {
            return Ok(SyncReport::default());
        }

        let records: Vec<AttendanceRecord> = batch.iter().map(Into::into).collect();
        let mut report = SyncReport::default();

        match self.target.deliver(&records).await {
            Ok(()) => {
                let ids: Vec<i64> = batch.iter().map(|log| log.id).collect();
                report.sent = self.db.mark_attendance_synced(&ids).await?;
                info!(sent = report.sent, "Attendance sync pass complete");
            }
            Err(e) => {
                let permanent = e.is_permanent();
                let error = e.to_string();

                for log in &batch {
                    let attempts = log.sync_attempts + 1;
                    let dead = permanent || attempts >= self.config.max_attempts;
                    let delay = backoff_delay(
                        u32::try_from(attempts).unwrap_or(u32::MAX),
                        self.config.backoff_base,
                        self.config.backoff_cap,
                    );
                    #[allow(clippy::cast_possible_wrap)]
                    let next_attempt_at = now + delay.as_secs() as i64;

                    self.db
                        .record_sync_failure(log.id, &error, next_attempt_at, dead)
                        .await?;

                    if dead {
                        report.dead += 1;
                    } else {
                        report.failed += 1;
                    }
                }

                warn!(
                    failed = report.failed,
                    dead = report.dead,
                    error = %error,
                    "Attendance sync pass failed"
                );
            }
        }

        Ok(report)
    }
}
