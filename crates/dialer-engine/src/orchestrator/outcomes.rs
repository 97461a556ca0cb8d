//! # Outcome Feed
//!
//! Call results come back from the switch asynchronously. The engine
//! accepts them on an unbounded channel via [`DialerEngine::report_outcome`]
//! and the server's outcome workers drain the channel through
//! [`DialerEngine::apply_outcome`].
//!
//! Applying is the only place a dispatched attempt leaves its in-flight
//! state, and it is idempotent end to end: the aggregator absorbs
//! duplicate events and a port is only released for a freshly applied one.

use tokio::sync::mpsc;
use tracing::debug;

use crate::database::OutcomeApplication;
use crate::error::{DialerError, Result};
use crate::queue::CallOutcome;

use super::core::DialerEngine;

impl DialerEngine {
    /// Queue a call outcome for processing
    ///
    /// Non-blocking; safe to call from a switch driver's event callback.
    /// Fails only if the engine's outcome workers are gone.
    pub fn report_outcome(&self, outcome: CallOutcome) -> Result<()> {
        self.outcome_tx
            .send(outcome)
            .map_err(|_| DialerError::internal("Outcome feed is closed"))
    }

    /// Apply a call outcome synchronously
    ///
    /// Runs the full pipeline: exactly-once application through the stats
    /// aggregator, then release of the attempt's port for freshly applied
    /// outcomes. Duplicates and stale events are absorbed without touching
    /// the port pool.
    pub async fn apply_outcome(&self, outcome: &CallOutcome) -> Result<OutcomeApplication> {
        let application = self.stats.ingest(outcome).await?;

        if let Some(port_id) = &application.port_to_release {
            // A failed release parks the port for the janitor; it no
            // longer affects this outcome.
            self.ports.release(port_id).await?;
        }

        debug!(
            "Outcome {} for attempt {} -> {:?}",
            outcome.status, application.attempt_id, application.disposition
        );
        Ok(application)
    }

    /// Take the consumer side of the outcome feed
    ///
    /// The server calls this once when spawning outcome workers; later
    /// calls return `None`.
    pub(crate) fn take_outcome_feed(&self) -> Option<mpsc::UnboundedReceiver<CallOutcome>> {
        self.outcome_rx.lock().take()
    }
}
