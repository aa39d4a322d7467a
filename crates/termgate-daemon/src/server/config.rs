//! Server configuration.

use std::net::SocketAddr;

use crate::session::SessionConfig;

#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// Address the terminal-facing listener binds.
    pub addr: SocketAddr,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 7788)),
            session: SessionConfig::default(),
        }
    }
}
