//! End-to-end tests driving the daemon over real sockets with a scripted
//! terminal.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use termgate_daemon::queue::{CommandKind, CommandQueue};
use termgate_daemon::registry::ConnectionRegistry;
use termgate_daemon::server::{ServerConfig, TerminalServer};
use termgate_daemon::session::{SessionConfig, SessionContext};
use termgate_daemon::storage::Database;
use termgate_core::protocol::build;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

struct Harness {
    addr: SocketAddr,
    db: Database,
    registry: ConnectionRegistry,
    queue: CommandQueue,
}

async fn start_server(session: SessionConfig) -> Harness {
    let db = Database::open_in_memory().await.unwrap();
    start_server_with_db(db, session).await
}

async fn start_server_with_db(db: Database, session: SessionConfig) -> Harness {
    let registry = ConnectionRegistry::new();
    let queue = CommandQueue::new(db.clone());
    let ctx = SessionContext {
        db: db.clone(),
        registry: registry.clone(),
        queue: queue.clone(),
        config: session,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = ServerConfig {
        addr,
        session,
    };
    let server = TerminalServer::new(&config, ctx);
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    Harness {
        addr,
        db,
        registry,
        queue,
    }
}

struct FakeDevice {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl FakeDevice {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    async fn send(&mut self, frame: &Value) {
        let mut line = frame.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for frame")
            .unwrap()
            .expect("connection closed while waiting for frame");
        serde_json::from_str(&line).unwrap()
    }

    /// Wait until the server closes the socket.
    async fn expect_closed(&mut self) {
        let line = timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for close")
            .unwrap();
        assert!(line.is_none(), "expected close, got frame: {line:?}");
    }

    async fn register(&mut self, sn: &str) -> Value {
        self.send(&json!({
            "cmd": "reg",
            "sn": sn,
            "devinfo": {"modelname": "tfs30", "firmware": "th600w v6.1"}
        }))
        .await;
        let ack = self.recv().await;
        assert_eq!(ack["ret"], "reg");
        assert_eq!(ack["result"], true);
        assert!(ack["cloudtime"].is_string());
        ack
    }
}

#[tokio::test]
async fn whitelist_rejects_unknown_terminal() {
    let harness = start_server(SessionConfig {
        require_whitelist: true,
        ..SessionConfig::default()
    })
    .await;

    let mut device = FakeDevice::connect(harness.addr).await;
    device.send(&json!({"cmd": "reg", "sn": "T001"})).await;

    let nack = device.recv().await;
    assert_eq!(nack["ret"], "reg");
    assert_eq!(nack["result"], false);
    assert!(nack["reason"].is_string());

    device.expect_closed().await;
    assert!(!harness.registry.is_connected("T001").await);
}

#[tokio::test]
async fn whitelisted_terminal_registers() {
    let db = Database::open_in_memory().await.unwrap();
    db.set_whitelisted("T001", true).await.unwrap();
    let harness = start_server_with_db(
        db,
        SessionConfig {
            require_whitelist: true,
            ..SessionConfig::default()
        },
    )
    .await;

    let mut device = FakeDevice::connect(harness.addr).await;
    device.register("T001").await;

    assert!(harness.registry.is_connected("T001").await);
    let terminal = harness.db.get_terminal("T001").await.unwrap().unwrap();
    assert_eq!(terminal.is_active, 1);
    assert_eq!(terminal.model, "tfs30");
}

#[tokio::test]
async fn attendance_batch_is_acked_and_stored() {
    let harness = start_server(SessionConfig::default()).await;

    let mut device = FakeDevice::connect(harness.addr).await;
    device.register("T002").await;

    device
        .send(&json!({
            "cmd": "sendlog",
            "sn": "T002",
            "count": 2,
            "logindex": 10,
            "record": [
                {"enrollid": 1, "time": "2025-03-01 08:00:00", "mode": 0, "inout": 0, "event": 0},
                {"enrollid": 2, "time": "2025-03-01 08:01:00", "mode": 1, "inout": 1, "event": 0}
            ]
        }))
        .await;

    let ack = device.recv().await;
    assert_eq!(ack["ret"], "sendlog");
    assert_eq!(ack["result"], true);
    assert_eq!(ack["count"], 2);
    assert_eq!(ack["logindex"], 10);
    // Multi-record uploads are backlog, not a live door event.
    assert_eq!(ack["access"], 0);

    let pending = harness.db.fetch_sync_batch(10, 5, i64::MAX).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].sn, "T002");
    assert_eq!(pending[0].sync_status, "pending");
}

#[tokio::test]
async fn single_live_event_opens_the_door() {
    let harness = start_server(SessionConfig::default()).await;

    let mut device = FakeDevice::connect(harness.addr).await;
    device.register("T002").await;

    device
        .send(&json!({
            "cmd": "sendlog",
            "sn": "T002",
            "count": 1,
            "logindex": 11,
            "record": [
                {"enrollid": 1, "time": "2025-03-01 08:00:00", "mode": 0, "inout": 0, "event": 0}
            ]
        }))
        .await;

    let ack = device.recv().await;
    assert_eq!(ack["result"], true);
    // Unknown users are granted.
    assert_eq!(ack["access"], 1);
}

#[tokio::test]
async fn queued_commands_arrive_right_after_registration() {
    let harness = start_server(SessionConfig::default()).await;

    harness
        .queue
        .enqueue(
            "T003",
            CommandKind::SetUserInfo,
            &build::setuserinfo(7, "Ada", 0, 0, &json!("template")),
        )
        .await
        .unwrap();
    harness
        .queue
        .enqueue("T003", CommandKind::OpenDoor, &build::opendoor(1, 5))
        .await
        .unwrap();

    let mut device = FakeDevice::connect(harness.addr).await;
    device.register("T003").await;

    // FIFO, immediately behind the registration ack.
    let first = device.recv().await;
    assert_eq!(first["cmd"], "setuserinfo");
    assert_eq!(first["enrollid"], 7);
    let second = device.recv().await;
    assert_eq!(second["cmd"], "opendoor");

    assert!(harness.queue.drain_pending("T003").await.unwrap().is_empty());
}

#[tokio::test]
async fn silent_connection_times_out() {
    let harness = start_server(SessionConfig {
        heartbeat_interval: Duration::from_millis(50),
        connection_timeout: Duration::from_millis(100),
        require_whitelist: false,
    })
    .await;

    let mut device = FakeDevice::connect(harness.addr).await;
    device.register("T004").await;
    assert!(harness.registry.is_connected("T004").await);

    // Stay silent past the timeout.
    device.expect_closed().await;

    assert!(!harness.registry.is_connected("T004").await);
    let terminal = harness.db.get_terminal("T004").await.unwrap().unwrap();
    assert_eq!(terminal.is_active, 0);
}

#[tokio::test]
async fn reconnect_evicts_previous_session() {
    let harness = start_server(SessionConfig::default()).await;

    let mut first = FakeDevice::connect(harness.addr).await;
    first.register("T005").await;

    let mut second = FakeDevice::connect(harness.addr).await;
    second.register("T005").await;

    // The first socket is torn down; the second stays live.
    first.expect_closed().await;
    assert_eq!(harness.registry.connection_count().await, 1);

    assert!(
        harness
            .registry
            .dispatch("T005", build::reboot().to_string())
            .await
    );
    let frame = second.recv().await;
    assert_eq!(frame["cmd"], "reboot");

    // The replacement's terminal must still be online.
    let terminal = harness.db.get_terminal("T005").await.unwrap().unwrap();
    assert_eq!(terminal.is_active, 1);
}

#[tokio::test]
async fn repeated_registration_keeps_the_session_alive() {
    let harness = start_server(SessionConfig::default()).await;

    let mut device = FakeDevice::connect(harness.addr).await;
    device.register("T010").await;

    // Terminals re-send reg after clock syncs or setting changes; the
    // session must survive its own re-registration.
    device.register("T010").await;

    device
        .send(&json!({
            "cmd": "sendlog",
            "sn": "T010",
            "count": 1,
            "logindex": 3,
            "record": [{"enrollid": 1, "time": "2025-03-01 08:00:00"}]
        }))
        .await;
    let ack = device.recv().await;
    assert_eq!(ack["ret"], "sendlog");
    assert_eq!(ack["result"], true);

    assert!(harness.registry.is_connected("T010").await);
    assert_eq!(harness.registry.connection_count().await, 1);
}

#[tokio::test]
async fn spoofed_serial_frames_are_dropped() {
    let harness = start_server(SessionConfig::default()).await;

    let mut device = FakeDevice::connect(harness.addr).await;
    device.register("T011").await;

    // Frames claiming another terminal's serial get no reply and no row.
    device
        .send(&json!({
            "cmd": "sendlog",
            "sn": "T999",
            "count": 1,
            "logindex": 1,
            "record": [{"enrollid": 1, "time": "2025-03-01 08:00:00"}]
        }))
        .await;
    device
        .send(&json!({"cmd": "sendqrcode", "sn": "T999", "record": "42"}))
        .await;

    // The next frame on the wire is the ack for the genuine serial, so
    // neither spoofed frame was answered.
    device
        .send(&json!({
            "cmd": "sendlog",
            "sn": "T011",
            "count": 1,
            "logindex": 2,
            "record": [{"enrollid": 2, "time": "2025-03-01 08:02:00"}]
        }))
        .await;
    let ack = device.recv().await;
    assert_eq!(ack["ret"], "sendlog");
    assert_eq!(ack["logindex"], 2);

    let rows = harness.db.fetch_sync_batch(10, 5, i64::MAX).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sn, "T011");

    assert!(harness.registry.is_connected("T011").await);
}

#[tokio::test]
async fn senduser_stores_and_acks() {
    let harness = start_server(SessionConfig::default()).await;

    let mut device = FakeDevice::connect(harness.addr).await;
    device.register("T006").await;

    device
        .send(&json!({
            "cmd": "senduser",
            "enrollid": 42,
            "name": "Ada",
            "backupnum": 0,
            "admin": 0,
            "record": "template-data"
        }))
        .await;

    let ack = device.recv().await;
    assert_eq!(ack["ret"], "senduser");
    assert_eq!(ack["result"], true);

    let user = harness.db.get_user("T006", 42).await.unwrap().unwrap();
    assert_eq!(user.name, "Ada");
}

#[tokio::test]
async fn qr_verdicts() {
    let harness = start_server(SessionConfig::default()).await;

    let mut device = FakeDevice::connect(harness.addr).await;
    device.register("T007").await;

    device
        .send(&json!({
            "cmd": "senduser",
            "enrollid": 42,
            "name": "Ada",
            "backupnum": 0
        }))
        .await;
    device.recv().await;

    // Known user: granted.
    device
        .send(&json!({"cmd": "sendqrcode", "sn": "T007", "record": "42"}))
        .await;
    let verdict = device.recv().await;
    assert_eq!(verdict["ret"], "sendqrcode");
    assert_eq!(verdict["access"], 1);
    assert_eq!(verdict["username"], "Ada");

    // Unknown code: denied.
    device
        .send(&json!({"cmd": "sendqrcode", "sn": "T007", "record": "999"}))
        .await;
    let verdict = device.recv().await;
    assert_eq!(verdict["access"], 0);

    // Disabled user: denied.
    harness.db.set_user_enabled("T007", 42, false).await.unwrap();
    device
        .send(&json!({"cmd": "sendqrcode", "sn": "T007", "record": "42"}))
        .await;
    let verdict = device.recv().await;
    assert_eq!(verdict["access"], 0);

    // Garbage code: denied without a lookup.
    device
        .send(&json!({"cmd": "sendqrcode", "sn": "T007", "record": "not-a-number"}))
        .await;
    let verdict = device.recv().await;
    assert_eq!(verdict["access"], 0);
    assert_eq!(verdict["enrollid"], 0);
}

#[tokio::test]
async fn frames_before_registration_are_dropped() {
    let harness = start_server(SessionConfig::default()).await;

    let mut device = FakeDevice::connect(harness.addr).await;
    device
        .send(&json!({
            "cmd": "sendlog",
            "sn": "T008",
            "count": 1,
            "record": [{"enrollid": 1, "time": "2025-03-01 08:00:00"}]
        }))
        .await;

    // No reply, no storage, and the session still registers afterwards.
    device.register("T008").await;
    let pending = harness.db.fetch_sync_batch(10, 5, i64::MAX).await.unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn malformed_frames_do_not_kill_the_session() {
    let harness = start_server(SessionConfig::default()).await;

    let mut device = FakeDevice::connect(harness.addr).await;
    device.register("T009").await;

    device.writer.write_all(b"this is not json\n").await.unwrap();
    device
        .writer
        .write_all(b"{\"neither\":\"cmd nor ret\"}\n")
        .await
        .unwrap();
    device.writer.flush().await.unwrap();

    // The session survives and keeps answering.
    device
        .send(&json!({
            "cmd": "sendlog",
            "sn": "T009",
            "count": 1,
            "logindex": 1,
            "record": [{"enrollid": 1, "time": "2025-03-01 08:00:00"}]
        }))
        .await;
    let ack = device.recv().await;
    assert_eq!(ack["ret"], "sendlog");
    assert_eq!(ack["result"], true);

    assert!(harness.registry.is_connected("T009").await);
}
