//! Database queries for the termgate daemon.

use serde::Serialize;
use termgate_core::db::unix_timestamp;
use termgate_core::protocol::{LogRecord, RegisterMessage, SendUserMessage};

use super::db::Database;
use super::models::{
    AttendanceLog, BiometricUser, CommandStatus, DeviceCommand, SyncStatus, Terminal,
};
use termgate_core::db::DatabaseError;

/// Per-status row counts for the attendance table.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SyncStats {
    pub pending: i64,
    pub sent: i64,
    pub failed: i64,
    pub dead: i64,
}

impl Database {
    // =========================================================================
    // Terminal queries
    // =========================================================================

    /// Insert or refresh a terminal row from a registration frame.
    pub async fn upsert_terminal(&self, reg: &RegisterMessage) -> Result<Terminal, DatabaseError> {
        let now = unix_timestamp();
        let d = &reg.devinfo;

        sqlx::query(
            "INSERT INTO terminals (sn, cpusn, model, firmware, mac_address, \
             user_capacity, fp_capacity, log_capacity, users_used, fp_used, logs_used, \
             is_active, last_seen, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?) \
             ON CONFLICT(sn) DO UPDATE SET \
             cpusn = excluded.cpusn, model = excluded.model, firmware = excluded.firmware, \
             mac_address = excluded.mac_address, user_capacity = excluded.user_capacity, \
             fp_capacity = excluded.fp_capacity, log_capacity = excluded.log_capacity, \
             users_used = excluded.users_used, fp_used = excluded.fp_used, \
             logs_used = excluded.logs_used, is_active = 1, last_seen = excluded.last_seen",
        )
        .bind(&reg.sn)
        .bind(&reg.cpusn)
        .bind(&d.modelname)
        .bind(&d.firmware)
        .bind(&d.mac)
        .bind(d.usersize)
        .bind(d.fpsize)
        .bind(d.logsize)
        .bind(d.useduser)
        .bind(d.usedfp)
        .bind(d.usedlog)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_terminal(&reg.sn)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Terminal {}", reg.sn)))
    }

    /// Get a terminal by serial number.
    pub async fn get_terminal(&self, sn: &str) -> Result<Option<Terminal>, DatabaseError> {
        let terminal = sqlx::query_as::<_, Terminal>("SELECT * FROM terminals WHERE sn = ?")
            .bind(sn)
            .fetch_optional(self.pool())
            .await?;

        Ok(terminal)
    }

    /// Flip a terminal's online flag.
    pub async fn set_terminal_active(&self, sn: &str, active: bool) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE terminals SET is_active = ?, last_seen = ? WHERE sn = ?")
            .bind(i64::from(active))
            .bind(unix_timestamp())
            .bind(sn)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Bump a terminal's last-seen timestamp.
    pub async fn touch_terminal(&self, sn: &str) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE terminals SET last_seen = ? WHERE sn = ?")
            .bind(unix_timestamp())
            .bind(sn)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Add or remove a serial from the registration whitelist. Creates the
    /// terminal row if the serial has never connected.
    pub async fn set_whitelisted(&self, sn: &str, whitelisted: bool) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO terminals (sn, is_whitelisted, created_at) VALUES (?, ?, ?) \
             ON CONFLICT(sn) DO UPDATE SET is_whitelisted = excluded.is_whitelisted",
        )
        .bind(sn)
        .bind(i64::from(whitelisted))
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    // =========================================================================
    // User queries
    // =========================================================================

    /// Store a user pushed from a terminal, including the credential payload
    /// when one is attached.
    pub async fn upsert_user(
        &self,
        sn: &str,
        user: &SendUserMessage,
    ) -> Result<(), DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT INTO biometric_users (sn, enrollid, name, admin, created_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(sn, enrollid) DO UPDATE SET \
             name = excluded.name, admin = excluded.admin",
        )
        .bind(sn)
        .bind(user.enrollid)
        .bind(&user.name)
        .bind(user.admin)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if let Some(record) = &user.record {
            sqlx::query(
                "INSERT INTO biometric_credentials (sn, enrollid, backupnum, record, created_at) \
                 VALUES (?, ?, ?, ?, ?) \
                 ON CONFLICT(sn, enrollid, backupnum) DO UPDATE SET record = excluded.record",
            )
            .bind(sn)
            .bind(user.enrollid)
            .bind(user.backupnum)
            .bind(record.to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Get a user by terminal serial and enrollment ID.
    pub async fn get_user(
        &self,
        sn: &str,
        enrollid: i64,
    ) -> Result<Option<BiometricUser>, DatabaseError> {
        let user = sqlx::query_as::<_, BiometricUser>(
            "SELECT * FROM biometric_users WHERE sn = ? AND enrollid = ?",
        )
        .bind(sn)
        .bind(enrollid)
        .fetch_optional(self.pool())
        .await?;

        Ok(user)
    }

    /// Enable or disable a user.
    pub async fn set_user_enabled(
        &self,
        sn: &str,
        enrollid: i64,
        enabled: bool,
    ) -> Result<bool, DatabaseError> {
        let result =
            sqlx::query("UPDATE biometric_users SET is_enabled = ? WHERE sn = ? AND enrollid = ?")
                .bind(i64::from(enabled))
                .bind(sn)
                .bind(enrollid)
                .execute(self.pool())
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Set a user's validity window (Unix timestamps, either end open).
    pub async fn set_user_validity(
        &self,
        sn: &str,
        enrollid: i64,
        valid_from: Option<i64>,
        valid_until: Option<i64>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE biometric_users SET valid_from = ?, valid_until = ? \
             WHERE sn = ? AND enrollid = ?",
        )
        .bind(valid_from)
        .bind(valid_until)
        .bind(sn)
        .bind(enrollid)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Attendance queries
    // =========================================================================

    /// Persist a batch of attendance records atomically. Each record carries
    /// the access verdict evaluated for it.
    pub async fn insert_attendance_batch(
        &self,
        sn: &str,
        records: &[(LogRecord, bool)],
    ) -> Result<u64, DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;
        let mut inserted = 0u64;

        for (record, granted) in records {
            let result = sqlx::query(
                "INSERT INTO attendance_logs \
                 (sn, enrollid, event_time, mode, inout, event, temperature, verify_mode, \
                  access_granted, sync_status, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(sn)
            .bind(record.enrollid)
            .bind(&record.time)
            .bind(record.mode)
            .bind(record.inout)
            .bind(record.event)
            .bind(record.temp)
            .bind(record.verifymode)
            .bind(i64::from(*granted))
            .bind(SyncStatus::Pending.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Fetch the next batch of records eligible for upstream delivery.
    ///
    /// Eligible means pending or failed, under the attempt cap, and past the
    /// backoff deadline. Ordered so retries do not starve fresh records
    /// forever and delivery stays roughly chronological.
    pub async fn fetch_sync_batch(
        &self,
        limit: i64,
        max_attempts: i64,
        now: i64,
    ) -> Result<Vec<AttendanceLog>, DatabaseError> {
        let logs = sqlx::query_as::<_, AttendanceLog>(
            "SELECT * FROM attendance_logs \
             WHERE sync_status IN ('pending', 'failed') \
             AND sync_attempts < ? AND next_attempt_at <= ? \
             ORDER BY next_attempt_at, id LIMIT ?",
        )
        .bind(max_attempts)
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(logs)
    }

    /// Mark a set of records as delivered.
    pub async fn mark_attendance_synced(&self, ids: &[i64]) -> Result<u64, DatabaseError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE attendance_logs SET sync_status = ?, synced_at = ?, sync_error = NULL \
             WHERE id IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql)
            .bind(SyncStatus::Sent.as_str())
            .bind(unix_timestamp());
        for id in ids {
            query = query.bind(id);
        }

        let result = query.execute(self.pool()).await?;
        Ok(result.rows_affected())
    }

    /// Record a delivery failure for one record.
    ///
    /// `dead` moves the record to the dead-letter state, otherwise it stays
    /// retryable with `next_attempt_at` as its backoff deadline.
    pub async fn record_sync_failure(
        &self,
        id: i64,
        error: &str,
        next_attempt_at: i64,
        dead: bool,
    ) -> Result<(), DatabaseError> {
        let status = if dead {
            SyncStatus::Dead
        } else {
            SyncStatus::Failed
        };

        sqlx::query(
            "UPDATE attendance_logs SET sync_status = ?, sync_attempts = sync_attempts + 1, \
             sync_error = ?, next_attempt_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(next_attempt_at)
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// List dead-lettered records, oldest first.
    pub async fn dead_letter(&self, limit: i64) -> Result<Vec<AttendanceLog>, DatabaseError> {
        let logs = sqlx::query_as::<_, AttendanceLog>(
            "SELECT * FROM attendance_logs WHERE sync_status = ? ORDER BY id LIMIT ?",
        )
        .bind(SyncStatus::Dead.as_str())
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(logs)
    }

    /// Return dead-lettered records to the retry pool with a fresh attempt
    /// budget.
    pub async fn reset_dead(&self, ids: &[i64]) -> Result<u64, DatabaseError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE attendance_logs SET sync_status = ?, sync_attempts = 0, \
             sync_error = NULL, next_attempt_at = 0 \
             WHERE sync_status = ? AND id IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql)
            .bind(SyncStatus::Pending.as_str())
            .bind(SyncStatus::Dead.as_str());
        for id in ids {
            query = query.bind(id);
        }

        let result = query.execute(self.pool()).await?;
        Ok(result.rows_affected())
    }

    /// Per-status attendance counts.
    pub async fn sync_stats(&self) -> Result<SyncStats, DatabaseError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT sync_status, COUNT(*) FROM attendance_logs GROUP BY sync_status",
        )
        .fetch_all(self.pool())
        .await?;

        let mut stats = SyncStats::default();
        for (status, count) in rows {
            match status.as_str() {
                "pending" => stats.pending = count,
                "sent" => stats.sent = count,
                "failed" => stats.failed = count,
                "dead" => stats.dead = count,
                _ => {}
            }
        }

        Ok(stats)
    }

    // =========================================================================
    // Command queue queries
    // =========================================================================

    /// Append a command to a terminal's queue.
    pub async fn enqueue_command(
        &self,
        sn: &str,
        command: &str,
        payload: &str,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO device_commands (sn, command, payload, status, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(sn)
        .bind(command)
        .bind(payload)
        .bind(CommandStatus::Pending.as_str())
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Pending commands for a terminal in enqueue order.
    pub async fn pending_commands(&self, sn: &str) -> Result<Vec<DeviceCommand>, DatabaseError> {
        let commands = sqlx::query_as::<_, DeviceCommand>(
            "SELECT * FROM device_commands WHERE sn = ? AND status = ? ORDER BY id",
        )
        .bind(sn)
        .bind(CommandStatus::Pending.as_str())
        .fetch_all(self.pool())
        .await?;

        Ok(commands)
    }

    /// Mark a queued command as written to the terminal socket.
    pub async fn mark_command_sent(&self, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE device_commands SET status = ?, sent_at = ? WHERE id = ?")
            .bind(CommandStatus::Sent.as_str())
            .bind(unix_timestamp())
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }
}
