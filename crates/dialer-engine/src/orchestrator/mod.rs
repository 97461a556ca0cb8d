//! # Dialer Orchestration
//!
//! The `DialerEngine` ties the subsystems together: it owns the database,
//! the port registry, the stats aggregator, the event hub, and the switch
//! driver, and exposes the operations everything else is driven through.
//!
//! The engine is split by concern:
//!
//! - `core`: construction, registration, and read-side queries
//! - `lifecycle`: campaign creation and operator state transitions
//! - `dispatch`: the scan that turns due attempts into outbound calls
//! - `outcomes`: the feed that turns call results back into state
//!
//! All operations are safe to call from many tasks at once; every
//! contended decision lands on a conditional database update, not on
//! in-process locking.

pub mod core;
pub mod dispatch;
pub mod lifecycle;
pub mod outcomes;
