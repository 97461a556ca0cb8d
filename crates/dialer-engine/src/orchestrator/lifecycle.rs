//! # Campaign Lifecycle Operations
//!
//! Creation plus the operator-driven state transitions. A transition is
//! evaluated against the pure state machine in [`crate::campaign`], then
//! committed with a compare-and-swap on the stored status; a lost swap is
//! re-evaluated from the fresh row instead of clobbering a concurrent
//! change.

use tracing::info;
use uuid::Uuid;

use crate::campaign::{Campaign, CampaignAction, CampaignStatus, NewCampaign};
use crate::error::{DialerError, Result};

use super::core::DialerEngine;

impl DialerEngine {
    /// Create a campaign and seed one call attempt per contact
    ///
    /// The campaign lands in `CREATED` with its full attempt queue already
    /// persisted; starting it later only flips the status. Creation is
    /// atomic: either the campaign row and every attempt exist, or none do.
    pub async fn create_campaign(&self, new: NewCampaign) -> Result<Campaign> {
        if new.name.trim().is_empty() {
            return Err(DialerError::configuration("Campaign name must not be empty"));
        }
        if new.greeting_reference.trim().is_empty() {
            return Err(DialerError::configuration(
                "Campaign greeting reference must not be empty",
            ));
        }

        let mut campaign = Campaign::from_new(format!("camp-{}", Uuid::new_v4()), &new);

        let mut tx = self.db.begin_transaction().await?;
        self.db.insert_campaign_tx(&mut tx, &campaign).await?;
        let seeded = self
            .db
            .seed_attempts_tx(&mut tx, &campaign.id, &new.contacts)
            .await?;
        self.db
            .set_campaign_total_tx(&mut tx, &campaign.id, seeded)
            .await?;
        tx.commit()
            .await
            .map_err(|e| DialerError::database(format!("Failed to commit campaign: {}", e)))?;

        campaign.total_attempts = seeded;
        info!(
            "📋 Campaign {} ({}) created with {} attempt(s)",
            campaign.id, campaign.name, seeded
        );
        Ok(campaign)
    }

    /// Start a created campaign, or restart a paused one
    pub async fn start_campaign(&self, campaign_id: &str) -> Result<CampaignStatus> {
        self.transition_campaign(campaign_id, CampaignAction::Start)
            .await
    }

    /// Suspend dispatching for a running campaign
    pub async fn pause_campaign(&self, campaign_id: &str) -> Result<CampaignStatus> {
        self.transition_campaign(campaign_id, CampaignAction::Pause)
            .await
    }

    /// Resume a paused campaign
    pub async fn resume_campaign(&self, campaign_id: &str) -> Result<CampaignStatus> {
        self.transition_campaign(campaign_id, CampaignAction::Resume)
            .await
    }

    /// Halt a campaign permanently
    ///
    /// In-flight calls finish on their own; their outcomes still apply to
    /// the stopped campaign's counters.
    pub async fn stop_campaign(&self, campaign_id: &str) -> Result<CampaignStatus> {
        self.transition_campaign(campaign_id, CampaignAction::Stop)
            .await
    }

    async fn transition_campaign(
        &self,
        campaign_id: &str,
        action: CampaignAction,
    ) -> Result<CampaignStatus> {
        let mut campaign = self
            .db
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| DialerError::not_found(format!("Campaign {} not found", campaign_id)))?;

        loop {
            let target = campaign.status.apply(action)?;

            if target == CampaignStatus::Running && !campaign.status.is_dispatchable() {
                self.check_start_guards(&campaign).await?;
            }

            if self
                .db
                .campaign_status_cas(campaign_id, campaign.status, target)
                .await?
            {
                info!(
                    "📋 Campaign {} {}: {} -> {}",
                    campaign_id, action, campaign.status, target
                );
                self.events
                    .campaign_state_changed(campaign_id, campaign.status, target);
                return Ok(target);
            }

            // Lost the swap to a concurrent transition. Re-read and apply
            // the action against whatever the campaign became.
            campaign = self.db.get_campaign(campaign_id).await?.ok_or_else(|| {
                DialerError::not_found(format!("Campaign {} not found", campaign_id))
            })?;
        }
    }

    /// Preconditions for bringing a campaign into `RUNNING`
    ///
    /// The concurrency cap is advisory under contention: two campaigns
    /// started at the same instant can both pass the count check. The cap
    /// bounds steady-state load, not a single racing pair.
    async fn check_start_guards(&self, campaign: &Campaign) -> Result<()> {
        let outstanding = self.db.outstanding_attempts(&campaign.id).await?;
        if outstanding == 0 {
            return Err(DialerError::resource_unavailable(format!(
                "Campaign {} has no dispatchable attempts left",
                campaign.id
            )));
        }

        let running = self.db.running_campaign_count().await?;
        let cap = self.config.general.max_concurrent_campaigns;
        if running >= cap {
            return Err(DialerError::resource_unavailable(format!(
                "Concurrent campaign limit reached ({} of {} running)",
                running, cap
            )));
        }

        Ok(())
    }
}
