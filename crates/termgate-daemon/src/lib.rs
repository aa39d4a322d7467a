//! Termgate daemon library.
//!
//! TCP server for biometric access terminals. Terminals hold one
//! persistent socket each; the daemon tracks live sessions, persists
//! attendance, queues commands for offline terminals, and forwards
//! attendance upstream over HTTP.

pub mod queue;
pub mod registry;
pub mod server;
pub mod session;
pub mod storage;
pub mod sync;
