//! Aggregate engine statistics for periodic status reporting.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::database::{AttemptCounts, PortCounts};

/// Point-in-time totals across the whole engine
///
/// Assembled on demand from the store; see
/// [`crate::DialerEngine::get_stats`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    /// Campaigns currently running
    pub running_campaigns: usize,

    /// Attempt totals by status across all campaigns
    pub attempts: AttemptCounts,

    /// Port totals by status across every registered device
    pub ports: PortCounts,

    /// Port releases parked after a failure, awaiting retry
    pub pending_releases: usize,
}

impl EngineStats {
    /// Log a one-line status summary
    pub fn log_summary(&self) {
        info!(
            "📊 Dialer status: {} running campaign(s), {} queued / {} retrying / {} dispatched attempts, ports {}A/{}B/{}E, {} pending release(s)",
            self.running_campaigns,
            self.attempts.queued,
            self.attempts.retrying,
            self.attempts.dispatched,
            self.ports.available,
            self.ports.busy,
            self.ports.error,
            self.pending_releases,
        );
    }
}
