//! Upstream attendance delivery.
//!
//! Stored attendance records are forwarded to an HTTP endpoint in batches.
//! Failures retry with exponential backoff; records that exhaust their
//! attempt budget or hit a permanent rejection move to a dead-letter state
//! an operator can inspect and reset.

mod backoff;
mod delivery;
mod pipeline;
mod types;

pub use backoff::backoff_delay;
pub use delivery::{HttpDeliveryConfig, HttpDeliveryTarget};
pub use pipeline::{SyncConfig, SyncPipeline};
pub use types::{AttendanceRecord, DeliveryError, DeliveryTarget, SyncReport};
