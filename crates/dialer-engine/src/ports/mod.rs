//! # Gateway Port Registry
//!
//! Tracks every voice channel on the registered gateway devices and owns
//! all port state changes: claims, releases, error flagging, and resets.
//! Nothing else in the engine writes port rows.
//!
//! Claims are linearizable per owner; see
//! [`PortRegistry::claim`] for the contention behavior.

mod registry;

pub use registry::PortRegistry;

pub use crate::database::{Port, PortCounts, PortStatus};
