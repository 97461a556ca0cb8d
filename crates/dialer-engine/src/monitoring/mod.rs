//! # Dialer Monitoring
//!
//! Real-time event notifications and aggregate engine statistics. The
//! event hub carries campaign progress snapshots to any number of
//! subscribers without ever blocking the workers that publish them.

mod events;
mod metrics;

pub use events::{DialerEvent, DialerEventHub};
pub use metrics::EngineStats;
