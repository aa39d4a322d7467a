//! Live connection tracking.

mod connection;

pub use connection::{ConnectionRegistry, SessionHandle};
