//! In-process switch driver for tests and demos.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::artifacts::ConfigBundle;
use crate::error::{DialerError, Result};
use crate::switch::{DispatchInstruction, SwitchDriver};

/// Switch driver that records calls instead of placing them
///
/// Applied bundles and originated instructions accumulate in memory until
/// drained, which lets a test (or the demo's auto-responder) observe each
/// dispatch and feed back whatever outcome it wants. `fail_next` arms a
/// failure budget so dispatch-fault handling can be exercised without a
/// broken switch.
#[derive(Debug, Default)]
pub struct LoopbackSwitch {
    applied: Mutex<Vec<ConfigBundle>>,
    instructions: Mutex<Vec<DispatchInstruction>>,
    failures_remaining: AtomicUsize,
}

impl LoopbackSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` originate calls fail with a dispatch fault
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Drain every instruction originated since the last drain
    pub fn take_instructions(&self) -> Vec<DispatchInstruction> {
        std::mem::take(&mut *self.instructions.lock())
    }

    /// Number of originated instructions not yet drained
    pub fn pending_instructions(&self) -> usize {
        self.instructions.lock().len()
    }

    /// Bundles applied so far, oldest first
    pub fn applied_bundles(&self) -> Vec<ConfigBundle> {
        self.applied.lock().clone()
    }

    fn consume_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SwitchDriver for LoopbackSwitch {
    async fn apply_config(&self, bundle: &ConfigBundle) -> Result<()> {
        debug!(
            "Loopback switch applied config for campaign {}",
            bundle.campaign_id
        );
        self.applied.lock().push(bundle.clone());
        Ok(())
    }

    async fn originate(&self, instruction: &DispatchInstruction) -> Result<()> {
        if self.consume_failure() {
            return Err(DialerError::dispatch_fault(format!(
                "Loopback switch rejected originate for attempt {}",
                instruction.attempt_id
            )));
        }

        debug!(
            "Loopback switch originated attempt {} to {} on channel {}",
            instruction.attempt_id, instruction.contact_phone, instruction.port_number
        );
        self.instructions.lock().push(instruction.clone());
        Ok(())
    }
}
