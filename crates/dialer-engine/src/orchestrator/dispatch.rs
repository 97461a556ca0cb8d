//! # Dispatch Scanning
//!
//! Turns due call attempts into outbound calls. Each cycle walks every
//! running campaign, pulls a bounded batch of due attempts, claims a port
//! per attempt, marks the attempt dispatched, then renders and hands the
//! call to the switch driver.
//!
//! Port claim and attempt dispatch are both conditional updates, so any
//! number of concurrent cycles (or engine instances on the same store)
//! stay consistent: a port is never double-claimed and an attempt never
//! burns two tries for one scan.

use tracing::{debug, info, warn};

use crate::artifacts::{campaign_context, generate_campaign_bundle};
use crate::campaign::Campaign;
use crate::database::{CallAttempt, Port, Provider};
use crate::error::Result;
use crate::queue::{CallOutcome, OutcomeStatus};
use crate::switch::DispatchInstruction;

use super::core::DialerEngine;

impl DialerEngine {
    /// Run one dispatch scan over every running campaign
    ///
    /// Returns the number of calls handed to the switch. A campaign that
    /// fails to scan is logged and skipped; one bad campaign never stalls
    /// the others.
    pub async fn run_dispatch_cycle(&self) -> Result<usize> {
        let campaigns = self.db.running_campaigns().await?;
        let mut dispatched = 0;

        for campaign in campaigns {
            match self.dispatch_campaign(&campaign).await {
                Ok(count) => dispatched += count,
                Err(e) => warn!("⚠️ Dispatch scan failed for campaign {}: {}", campaign.id, e),
            }
        }

        Ok(dispatched)
    }

    async fn dispatch_campaign(&self, campaign: &Campaign) -> Result<usize> {
        let due = self
            .db
            .due_attempts(&campaign.id, self.config.scheduler.max_dispatches_per_cycle)
            .await?;
        if due.is_empty() {
            return Ok(0);
        }

        let provider = match &campaign.provider_id {
            Some(id) => self.db.get_provider(id).await?,
            None => None,
        };

        let mut count = 0;
        for attempt in due {
            let claimed = self
                .ports
                .claim(&campaign.owner_id, &campaign.id, campaign.preferred_port())
                .await?;

            let Some(port) = claimed else {
                // Out of ports. The remaining due attempts keep their
                // place and are picked up by a later cycle.
                debug!(
                    "⏳ No free port for campaign {}; attempts wait for the next cycle",
                    campaign.id
                );
                break;
            };

            if !self.db.dispatch_attempt_row(&attempt.id, &port.id).await? {
                // A concurrent scan dispatched this attempt first. Hand
                // the port straight back.
                self.ports.release(&port.id).await?;
                continue;
            }

            match self.place_call(campaign, provider.as_ref(), &attempt, &port).await {
                Ok(()) => {
                    info!(
                        "📞 Attempt {} dialing {} on port {} (try {})",
                        attempt.id,
                        attempt.contact_phone,
                        port.id,
                        attempt.attempts + 1
                    );
                    count += 1;
                }
                Err(e) => {
                    // The try is already consumed; fold the fault into the
                    // normal outcome path so retry accounting and the port
                    // release happen in one place.
                    warn!("⚠️ Dispatch fault for attempt {}: {}", attempt.id, e);
                    let outcome = CallOutcome::new(
                        &attempt.id,
                        &campaign.id,
                        attempt.attempts + 1,
                        OutcomeStatus::Failed,
                    )
                    .with_port(&port.id);
                    self.apply_outcome(&outcome).await?;
                }
            }
        }

        Ok(count)
    }

    /// Render the campaign's artifacts for the claimed port and originate
    async fn place_call(
        &self,
        campaign: &Campaign,
        provider: Option<&Provider>,
        attempt: &CallAttempt,
        port: &Port,
    ) -> Result<()> {
        let bundle = generate_campaign_bundle(
            campaign,
            provider,
            Some(port.port_number),
            &self.config.general,
        )?;

        let instruction = DispatchInstruction {
            attempt_id: attempt.id.clone(),
            campaign_id: campaign.id.clone(),
            contact_phone: attempt.contact_phone.clone(),
            port_id: port.id.clone(),
            port_number: port.port_number,
            // The row update already consumed the try, so the attempt we
            // loaded during the scan is one behind.
            try_number: attempt.attempts + 1,
            context: campaign_context(&campaign.id),
        };

        self.switch.apply_config(&bundle).await?;
        self.switch.originate(&instruction).await
    }
}
