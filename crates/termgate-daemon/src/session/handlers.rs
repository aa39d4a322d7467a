//! Frame handlers.
//!
//! Single-frame failures (storage errors, bad payloads) answer with a
//! negative acknowledgement and keep the session open; only registration
//! refusal and socket-level errors close it.

use std::sync::Arc;

use tracing::{error, info, warn};

use termgate_core::db::unix_timestamp;
use termgate_core::protocol::{
    DeviceResponse, LogRecord, Message, QrCodeMessage, RegisterMessage, SendLogMessage,
    SendUserMessage, build, cloudtime_now,
};

use crate::registry::SessionHandle;
use crate::storage::BiometricUser;

use super::connection::{Flow, Session};

/// Verdict for a QR scan, sent back verbatim to the terminal.
struct QrVerdict {
    access: i64,
    enrollid: i64,
    username: String,
    message: &'static str,
}

impl Session {
    pub(crate) async fn handle_message(&mut self, message: Message) -> Flow {
        // Everything except `reg` needs an established session.
        if self.sn.is_none() && !matches!(message, Message::Reg(_)) {
            warn!(peer = %self.peer, kind = message.kind(), "Frame before registration, dropping");
            return Flow::Continue;
        }

        match message {
            Message::Reg(reg) => self.handle_reg(reg).await,
            Message::SendLog(log) => self.handle_sendlog(log).await,
            Message::SendUser(user) => self.handle_senduser(user).await,
            Message::SendQrCode(qr) => self.handle_qrcode(qr).await,
            Message::Response(resp) => {
                self.handle_response(&resp);
                Flow::Continue
            }
            Message::Unknown { kind, .. } => {
                warn!(peer = %self.peer, kind = %kind, "Unhandled command, dropping");
                Flow::Continue
            }
        }
    }

    // =========================================================================
    // reg
    // =========================================================================

    async fn handle_reg(&mut self, reg: RegisterMessage) -> Flow {
        if self.ctx.config.require_whitelist {
            match self.ctx.db.get_terminal(&reg.sn).await {
                Ok(Some(t)) if t.is_whitelisted == 1 => {}
                Ok(_) => {
                    warn!(serial = %reg.sn, peer = %self.peer, "Rejecting non-whitelisted terminal");
                    let _ = self.send_value(&build::reg_nack("terminal not authorized")).await;
                    return Flow::Close;
                }
                Err(e) => {
                    error!(serial = %reg.sn, error = %e, "Whitelist lookup failed");
                    let _ = self.send_value(&build::reg_nack("server error")).await;
                    return Flow::Close;
                }
            }
        }

        if let Err(e) = self.ctx.db.upsert_terminal(&reg).await {
            error!(serial = %reg.sn, error = %e, "Failed to persist terminal");
            let _ = self.send_value(&build::reg_nack("server error")).await;
            return Flow::Close;
        }

        // A terminal re-registering under a different serial on the same
        // socket releases its old registry entry first.
        if let Some(old) = self.sn.take() {
            if old != reg.sn {
                self.ctx.registry.unregister(&old, self.session_id).await;
            }
        }
        self.sn = Some(reg.sn.clone());

        let handle = SessionHandle {
            session_id: self.session_id,
            serial: reg.sn.clone(),
            frame_tx: self.frame_tx.clone(),
            shutdown: Arc::clone(&self.shutdown),
        };
        self.ctx.registry.register(handle).await;

        info!(serial = %reg.sn, model = %reg.devinfo.modelname, peer = %self.peer, "Terminal registered");

        if self
            .send_value(&build::reg_ack(&cloudtime_now(), true))
            .await
            .is_err()
        {
            return Flow::Close;
        }

        // Queued commands go out right behind the ack, before any further
        // device frame is processed.
        self.drain_commands(&reg.sn).await
    }

    async fn drain_commands(&mut self, sn: &str) -> Flow {
        let pending = match self.ctx.queue.drain_pending(sn).await {
            Ok(pending) => pending,
            Err(e) => {
                error!(serial = %sn, error = %e, "Failed to load pending commands");
                return Flow::Continue;
            }
        };

        for command in pending {
            if let Err(e) = self.send_raw(&format!("{}\n", command.payload)).await {
                // The command was never written, so it stays pending for
                // the next session.
                warn!(serial = %sn, command = %command.command, error = %e, "Write failed while draining queue");
                return Flow::Close;
            }
            if let Err(e) = self.ctx.queue.mark_sent(command.id).await {
                error!(serial = %sn, id = command.id, error = %e, "Failed to mark command sent");
            }
            info!(serial = %sn, command = %command.command, id = command.id, "Queued command delivered");
        }

        Flow::Continue
    }

    // =========================================================================
    // sendlog
    // =========================================================================

    async fn handle_sendlog(&mut self, log: SendLogMessage) -> Flow {
        if self.sn.as_deref() != Some(log.sn.as_str()) {
            warn!(peer = %self.peer, frame_sn = %log.sn, session_sn = ?self.sn, "Serial mismatch in sendlog, dropping");
            return Flow::Continue;
        }

        let mut rows = Vec::with_capacity(log.records.len());
        let mut last_granted = false;
        for record in log.records {
            let granted = self.evaluate_access(&log.sn, &record).await;
            last_granted = granted;
            rows.push((record, granted));
        }

        // The access flag drives the door relay, so it is only meaningful
        // for a live single-event upload. Backlog batches get 0.
        let door_event = rows.len() == 1;
        let access = i64::from(door_event && last_granted);

        #[allow(clippy::cast_possible_wrap)]
        let count = rows.len() as i64;

        if let Err(e) = self.ctx.db.insert_attendance_batch(&log.sn, &rows).await {
            error!(serial = %log.sn, error = %e, "Failed to persist attendance batch");
            let _ = self.send_value(&build::sendlog_nack()).await;
            return Flow::Continue;
        }

        if let Err(e) = self.ctx.db.touch_terminal(&log.sn).await {
            warn!(serial = %log.sn, error = %e, "Failed to update last seen");
        }

        info!(serial = %log.sn, count, logindex = log.logindex, access, "Attendance batch stored");

        if self
            .send_value(&build::sendlog_ack(count, log.logindex, &cloudtime_now(), access))
            .await
            .is_err()
        {
            return Flow::Close;
        }

        Flow::Continue
    }

    /// Access verdict for one attendance record.
    ///
    /// Unknown users are granted: enrollment may live only on the terminal.
    /// A user the server does know must be enabled and inside any validity
    /// window.
    async fn evaluate_access(&self, sn: &str, record: &LogRecord) -> bool {
        if record.enrollid <= 0 {
            // System events (door sensor, tamper) carry no user.
            return true;
        }

        match self.ctx.db.get_user(sn, record.enrollid).await {
            Ok(Some(user)) => user_allowed(&user),
            Ok(None) => true,
            Err(e) => {
                warn!(serial = %sn, enrollid = record.enrollid, error = %e, "Access lookup failed, granting");
                true
            }
        }
    }

    // =========================================================================
    // senduser
    // =========================================================================

    async fn handle_senduser(&mut self, user: SendUserMessage) -> Flow {
        let Some(sn) = self.sn.clone() else {
            return Flow::Continue;
        };

        match self.ctx.db.upsert_user(&sn, &user).await {
            Ok(()) => {
                info!(serial = %sn, enrollid = user.enrollid, backupnum = user.backupnum, "User stored");
                if self
                    .send_value(&build::senduser_ack(&cloudtime_now()))
                    .await
                    .is_err()
                {
                    return Flow::Close;
                }
            }
            Err(e) => {
                error!(serial = %sn, enrollid = user.enrollid, error = %e, "Failed to store user");
                let _ = self.send_value(&build::senduser_nack()).await;
            }
        }

        Flow::Continue
    }

    // =========================================================================
    // sendqrcode
    // =========================================================================

    async fn handle_qrcode(&mut self, qr: QrCodeMessage) -> Flow {
        if self.sn.as_deref() != Some(qr.sn.as_str()) {
            warn!(peer = %self.peer, frame_sn = %qr.sn, "Serial mismatch in sendqrcode, dropping");
            return Flow::Continue;
        }

        let verdict = self.check_qrcode(&qr).await;
        info!(
            serial = %qr.sn,
            enrollid = verdict.enrollid,
            access = verdict.access,
            message = verdict.message,
            "QR verdict"
        );

        let reply = build::qrcode_ack(
            verdict.access,
            verdict.enrollid,
            &verdict.username,
            verdict.message,
        );
        if self.send_value(&reply).await.is_err() {
            return Flow::Close;
        }

        Flow::Continue
    }

    /// QR codes are the opposite of attendance records: the terminal knows
    /// nothing about the bearer, so an unknown code is denied.
    async fn check_qrcode(&self, qr: &QrCodeMessage) -> QrVerdict {
        let Ok(enrollid) = qr.record.trim().parse::<i64>() else {
            return QrVerdict {
                access: 0,
                enrollid: 0,
                username: String::new(),
                message: "invalid code format",
            };
        };

        match self.ctx.db.get_user(&qr.sn, enrollid).await {
            Ok(Some(user)) if user_allowed(&user) => QrVerdict {
                access: 1,
                enrollid,
                username: user.name,
                message: "access granted",
            },
            Ok(Some(user)) if user.is_enabled == 0 => QrVerdict {
                access: 0,
                enrollid,
                username: user.name,
                message: "user disabled",
            },
            Ok(Some(user)) => QrVerdict {
                access: 0,
                enrollid,
                username: user.name,
                message: "outside validity window",
            },
            Ok(None) => QrVerdict {
                access: 0,
                enrollid,
                username: String::new(),
                message: "unknown code",
            },
            Err(e) => {
                warn!(serial = %qr.sn, enrollid, error = %e, "QR lookup failed");
                QrVerdict {
                    access: 0,
                    enrollid,
                    username: String::new(),
                    message: "server error",
                }
            }
        }
    }

    // =========================================================================
    // command replies
    // =========================================================================

    /// Replies to queued commands are logged and dropped. The queue marks a
    /// command sent at write time, so there is nothing to correlate here.
    fn handle_response(&self, resp: &DeviceResponse) {
        if resp.result {
            info!(serial = ?self.sn, ret = %resp.ret, "Command acknowledged");
        } else {
            warn!(serial = ?self.sn, ret = %resp.ret, payload = %resp.payload, "Command failed on terminal");
        }
    }
}

/// Enabled and inside any validity window right now.
fn user_allowed(user: &BiometricUser) -> bool {
    if user.is_enabled == 0 {
        return false;
    }
    let now = unix_timestamp();
    if user.valid_from.is_some_and(|from| now < from) {
        return false;
    }
    if user.valid_until.is_some_and(|until| now > until) {
        return false;
    }
    true
}
