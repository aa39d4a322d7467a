//! Termgate core library.
//!
//! Shared building blocks for the termgate daemon:
//! - the TM20-family terminal wire protocol (parse, validate, build)
//! - database helpers shared by storage layers
//! - tracing/logging initialization

pub mod db;
pub mod error;
pub mod protocol;
pub mod tracing_init;

pub use error::{Error, Result};
