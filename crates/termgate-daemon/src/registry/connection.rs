//! In-memory registry of live terminal sessions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Handle to one live terminal session.
///
/// Owned by the registry; the session task itself keeps only its own
/// `session_id` and shutdown `Notify` so it can tell whether a registry
/// entry still belongs to it.
#[derive(Clone)]
pub struct SessionHandle {
    /// Unique per TCP connection, not per terminal.
    pub session_id: Uuid,
    /// Terminal serial number this session registered as.
    pub serial: String,
    /// Sender for pushing serialised frames out through the session writer.
    pub frame_tx: mpsc::Sender<String>,
    /// Signalled when the session must shut down (eviction by a newer
    /// connection for the same serial).
    pub shutdown: Arc<Notify>,
}

impl SessionHandle {
    pub fn new(session_id: Uuid, serial: String, frame_tx: mpsc::Sender<String>) -> Self {
        Self {
            session_id,
            serial,
            frame_tx,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Ask the owning session task to close. `notify_one` stores a permit,
    /// so this works even if the task is not awaiting yet.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }
}

/// Thread-safe registry mapping serial number to the single live session.
///
/// A single `Mutex` keeps eviction atomic: inserting the new handle and
/// obtaining the evicted one happen under one lock, so two racing
/// registrations for the same serial cannot both survive.
#[derive(Clone)]
pub struct ConnectionRegistry {
    sessions: Arc<Mutex<HashMap<String, SessionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a session for a serial, evicting any previous session.
    ///
    /// A session re-registering under its own serial just refreshes the
    /// entry; eviction only fires when the displaced handle belongs to a
    /// different session, so a repeated `reg` cannot shoot down its own
    /// connection.
    pub async fn register(&self, handle: SessionHandle) {
        let serial = handle.serial.clone();
        let session_id = handle.session_id;
        let old = self.sessions.lock().await.insert(serial.clone(), handle);
        match old {
            Some(old) if old.session_id != session_id => {
                warn!(serial = %serial, old_session = %old.session_id, "Replacing existing connection");
                old.close();
            }
            Some(_) => {
                debug!(serial = %serial, "Session re-registered");
            }
            None => {
                info!(serial = %serial, "Session registered");
            }
        }
    }

    /// Remove a session, but only if the entry still belongs to the caller.
    ///
    /// An evicted session that unregisters late must not tear down the
    /// replacement, so removal is keyed on `session_id`.
    pub async fn unregister(&self, serial: &str, session_id: Uuid) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(serial) {
            Some(current) if current.session_id == session_id => {
                sessions.remove(serial);
                info!(serial = %serial, "Session unregistered");
                true
            }
            _ => false,
        }
    }

    /// Get the live session handle for a serial.
    pub async fn lookup(&self, serial: &str) -> Option<SessionHandle> {
        self.sessions.lock().await.get(serial).cloned()
    }

    /// Push a serialised frame to a terminal. Returns `false` when the
    /// terminal is offline or its outbound channel is closed.
    pub async fn dispatch(&self, serial: &str, frame: String) -> bool {
        match self.lookup(serial).await {
            Some(handle) => handle.frame_tx.send(frame).await.is_ok(),
            None => false,
        }
    }

    /// Check whether a terminal has a live session.
    pub async fn is_connected(&self, serial: &str) -> bool {
        self.sessions.lock().await.contains_key(serial)
    }

    /// Serials of all connected terminals.
    pub async fn list_connected(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    /// Count of live sessions.
    pub async fn connection_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
