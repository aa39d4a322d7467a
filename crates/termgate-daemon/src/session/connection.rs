//! Connection lifecycle: read loop, heartbeat timeout, teardown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use termgate_core::protocol::parse_line;

use crate::queue::CommandQueue;
use crate::registry::ConnectionRegistry;
use crate::storage::Database;

/// Session timing and policy knobs.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// How often the timeout check runs.
    pub heartbeat_interval: Duration,
    /// Silence threshold after which the connection is presumed dead.
    pub connection_timeout: Duration,
    /// When set, only whitelisted serials may register.
    pub require_whitelist: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(120),
            require_whitelist: false,
        }
    }
}

/// Shared dependencies handed to every session task.
#[derive(Clone)]
pub struct SessionContext {
    pub db: Database,
    pub registry: ConnectionRegistry,
    pub queue: CommandQueue,
    pub config: SessionConfig,
}

/// Whether the session loop keeps running after a frame.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Close,
}

pub(crate) struct Session {
    pub(crate) ctx: SessionContext,
    pub(crate) peer: SocketAddr,
    pub(crate) session_id: Uuid,
    /// Serial this session registered as; `None` until the `reg` frame.
    pub(crate) sn: Option<String>,
    pub(crate) writer: OwnedWriteHalf,
    pub(crate) frame_tx: mpsc::Sender<String>,
    pub(crate) shutdown: Arc<Notify>,
}

impl Session {
    /// Serialise a frame and write it with the newline delimiter.
    pub(crate) async fn send_value(&mut self, value: &Value) -> std::io::Result<()> {
        let mut line = value.to_string();
        line.push('\n');
        self.send_raw(&line).await
    }

    pub(crate) async fn send_raw(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await
    }

    async fn handle_line(&mut self, line: &str) -> Flow {
        let message = match parse_line(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "Dropping malformed frame");
                return Flow::Continue;
            }
        };

        debug!(peer = %self.peer, kind = message.kind(), "Frame received");
        self.handle_message(message).await
    }

    /// Tear down the session. Idempotent: the first call takes `sn`.
    async fn close(&mut self) {
        let _ = self.writer.shutdown().await;

        let Some(sn) = self.sn.take() else { return };

        // An evicted session must not mark the replacement's terminal
        // offline, so the flag only flips when this session still owned
        // the registry entry.
        if self.ctx.registry.unregister(&sn, self.session_id).await {
            if let Err(e) = self.ctx.db.set_terminal_active(&sn, false).await {
                warn!(serial = %sn, error = %e, "Failed to mark terminal inactive");
            }
        }

        info!(serial = %sn, peer = %self.peer, "Session closed");
    }
}

/// Drive one terminal connection to completion.
pub async fn run_connection(ctx: SessionContext, stream: TcpStream, peer: SocketAddr) {
    info!(peer = %peer, "Terminal connected");

    let config = ctx.config;
    let (read_half, write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let (frame_tx, mut frame_rx) = mpsc::channel::<String>(32);

    let mut session = Session {
        ctx,
        peer,
        session_id: Uuid::new_v4(),
        sn: None,
        writer: write_half,
        frame_tx,
        shutdown: Arc::new(Notify::new()),
    };

    let shutdown = Arc::clone(&session.shutdown);
    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_frame = Instant::now();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    last_frame = Instant::now();
                    if session.handle_line(&line).await == Flow::Close {
                        break;
                    }
                }
                Ok(None) => {
                    debug!(peer = %peer, "Terminal disconnected");
                    break;
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Read error");
                    break;
                }
            },
            frame = frame_rx.recv() => match frame {
                Some(mut frame) => {
                    if !frame.ends_with('\n') {
                        frame.push('\n');
                    }
                    if let Err(e) = session.send_raw(&frame).await {
                        warn!(peer = %peer, error = %e, "Write error");
                        break;
                    }
                }
                None => break,
            },
            _ = heartbeat.tick() => {
                if last_frame.elapsed() >= config.connection_timeout {
                    warn!(peer = %peer, serial = ?session.sn, "Connection timed out");
                    break;
                }
            },
            () = shutdown.notified() => {
                info!(peer = %peer, serial = ?session.sn, "Session evicted by newer connection");
                break;
            },
        }
    }

    session.close().await;
}
