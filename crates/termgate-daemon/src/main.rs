//! Termgate Daemon
//!
//! TCP server for biometric access terminals: persistent sessions, durable
//! command queue, and upstream attendance sync.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use termgate_core::tracing_init::init_tracing;

use termgate_daemon::queue::CommandQueue;
use termgate_daemon::registry::ConnectionRegistry;
use termgate_daemon::server::{ServerConfig, TerminalServer};
use termgate_daemon::session::{SessionConfig, SessionContext};
use termgate_daemon::storage::Database;
use termgate_daemon::sync::{HttpDeliveryConfig, HttpDeliveryTarget, SyncConfig, SyncPipeline};

#[derive(Parser, Debug)]
#[command(name = "termgate-daemon")]
#[command(
    version,
    about = "Termgate daemon - access terminal fleet server"
)]
struct Args {
    /// Address the terminal-facing listener binds.
    #[arg(long, env = "TERMGATE_ADDR", default_value = "0.0.0.0:7788")]
    addr: SocketAddr,

    /// Path to SQLite database file.
    #[arg(long, env = "TERMGATE_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Heartbeat check interval in seconds.
    #[arg(long, env = "TERMGATE_HEARTBEAT_INTERVAL", default_value_t = 30)]
    heartbeat_interval: u64,

    /// Seconds of silence before a connection is presumed dead.
    #[arg(long, env = "TERMGATE_CONNECTION_TIMEOUT", default_value_t = 120)]
    connection_timeout: u64,

    /// Only allow whitelisted serials to register.
    #[arg(long, env = "TERMGATE_REQUIRE_WHITELIST")]
    require_whitelist: bool,

    /// Upstream endpoint receiving attendance batches. Sync is disabled
    /// when unset.
    #[arg(long, env = "TERMGATE_SYNC_ENDPOINT")]
    sync_endpoint: Option<String>,

    /// Bearer token for the sync endpoint.
    #[arg(long, env = "TERMGATE_SYNC_TOKEN")]
    sync_token: Option<String>,

    /// Seconds between sync passes.
    #[arg(long, env = "TERMGATE_SYNC_INTERVAL", default_value_t = 60)]
    sync_interval: u64,

    /// Attendance records per sync batch.
    #[arg(long, env = "TERMGATE_SYNC_BATCH_SIZE", default_value_t = 100)]
    sync_batch_size: i64,

    /// Delivery attempts before a record dead-letters.
    #[arg(long, env = "TERMGATE_SYNC_MAX_ATTEMPTS", default_value_t = 5)]
    sync_max_attempts: i64,

    /// First retry delay in seconds.
    #[arg(long, env = "TERMGATE_SYNC_BACKOFF_BASE", default_value_t = 60)]
    sync_backoff_base: u64,

    /// Retry delay ceiling in seconds.
    #[arg(long, env = "TERMGATE_SYNC_BACKOFF_CAP", default_value_t = 3600)]
    sync_backoff_cap: u64,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "TERMGATE_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing("termgate_daemon=info", args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        "Starting termgate-daemon"
    );

    let db = match &args.db_path {
        Some(path) => {
            info!(path = %path.display(), "Opening database");
            Database::open(path).await?
        }
        None => {
            let default_path = default_db_path()?;
            info!(path = %default_path.display(), "Opening database (default path)");
            Database::open(&default_path).await?
        }
    };

    let session_config = SessionConfig {
        heartbeat_interval: Duration::from_secs(args.heartbeat_interval),
        connection_timeout: Duration::from_secs(args.connection_timeout),
        require_whitelist: args.require_whitelist,
    };
    let server_config = ServerConfig {
        addr: args.addr,
        session: session_config,
    };

    let registry = ConnectionRegistry::new();
    let queue = CommandQueue::new(db.clone());
    let ctx = SessionContext {
        db: db.clone(),
        registry,
        queue,
        config: server_config.session,
    };

    if let Some(endpoint) = args.sync_endpoint.clone() {
        let sync_config = SyncConfig {
            batch_size: args.sync_batch_size,
            max_attempts: args.sync_max_attempts,
            backoff_base: Duration::from_secs(args.sync_backoff_base),
            backoff_cap: Duration::from_secs(args.sync_backoff_cap),
        };
        let target = HttpDeliveryTarget::new(HttpDeliveryConfig {
            endpoint: endpoint.clone(),
            bearer_token: args.sync_token.clone(),
            timeout: Duration::from_secs(30),
        })
        .map_err(|e| anyhow::anyhow!("{e}"))?;
        let pipeline = SyncPipeline::new(db.clone(), target, sync_config);

        info!(endpoint = %endpoint, interval = args.sync_interval, "Attendance sync enabled");

        let interval = Duration::from_secs(args.sync_interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // Skip first immediate tick
            loop {
                ticker.tick().await;
                match pipeline.run_once().await {
                    Ok(report) if report.sent + report.failed + report.dead > 0 => {
                        info!(
                            sent = report.sent,
                            failed = report.failed,
                            dead = report.dead,
                            "Sync pass"
                        );
                    }
                    Err(e) => {
                        warn!(error = %e, "Sync pass failed");
                    }
                    _ => {}
                }
            }
        });
    } else {
        info!("Attendance sync disabled (no endpoint configured)");
    }

    let server = TerminalServer::new(&server_config, ctx);

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Daemon stopped");
    Ok(())
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let data = dirs::data_dir()
        .ok_or_else(|| anyhow::anyhow!("Cannot determine data directory"))?;
    Ok(data.join("termgate").join("termgate.db"))
}
