//! Per-connection session state machine.
//!
//! Each accepted socket gets one task running [`run_connection`]. The task
//! owns the write half, so replies, drained queue commands, and frames
//! dispatched through the registry all leave through a single writer in a
//! well-defined order.

mod connection;
mod handlers;

pub use connection::{SessionConfig, SessionContext, run_connection};
