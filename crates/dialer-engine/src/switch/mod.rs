//! # Switch Driver Abstraction
//!
//! The engine never talks to telephony hardware directly. It renders
//! config artifacts, then hands them plus per-call originate requests to a
//! [`SwitchDriver`]. Production deployments back this with a real switch
//! integration; tests and demos use [`LoopbackSwitch`], which records what
//! it was asked to do and lets the caller script failures.

mod loopback;

pub use loopback::LoopbackSwitch;

use async_trait::async_trait;

use crate::artifacts::ConfigBundle;
use crate::error::Result;

/// Everything a switch needs to place one outbound call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchInstruction {
    pub attempt_id: String,
    pub campaign_id: String,
    /// Destination number for the outbound leg
    pub contact_phone: String,
    /// Registry id of the claimed port
    pub port_id: String,
    /// Channel number encoded into the dial string
    pub port_number: u16,
    /// 1-based try this dispatch represents
    ///
    /// Drivers echo it on the resulting [`crate::queue::CallOutcome`] so
    /// the outcome can be matched to the dispatch that placed the call.
    pub try_number: u32,
    /// Dialplan context the answered call lands in
    pub context: String,
}

/// Boundary between the orchestration core and the telephony switch
///
/// Both operations are fallible at the switch level only. Callers treat an
/// error as a dispatch fault for the affected attempt; the engine's own
/// state is reconciled by the outcome path, never by the driver.
#[async_trait]
pub trait SwitchDriver: Send + Sync {
    /// Install (or refresh) the rendered artifacts for a campaign
    ///
    /// Bundles are deterministic, so drivers may apply them repeatedly
    /// without tracking whether anything changed.
    async fn apply_config(&self, bundle: &ConfigBundle) -> Result<()>;

    /// Ask the switch to originate one call
    async fn originate(&self, instruction: &DispatchInstruction) -> Result<()>;
}
