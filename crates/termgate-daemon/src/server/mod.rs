//! TCP listener and accept loop.

mod config;

pub use config::ServerConfig;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::session::{SessionContext, run_connection};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The terminal-facing TCP server.
pub struct TerminalServer {
    addr: SocketAddr,
    ctx: SessionContext,
}

impl TerminalServer {
    pub fn new(config: &ServerConfig, ctx: SessionContext) -> Self {
        Self {
            addr: config.addr,
            ctx,
        }
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "Terminal server listening");
        self.serve(listener).await
    }

    /// Accept loop over an already-bound listener. Split out so tests can
    /// bind an ephemeral port themselves.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        run_connection(ctx, stream, peer).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept failed");
                }
            }
        }
    }
}
