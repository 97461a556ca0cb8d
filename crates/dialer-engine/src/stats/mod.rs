//! # Campaign Stats Aggregation
//!
//! Single sink for call outcomes. Every outcome reported by the switch (or
//! synthesized by the dispatcher on a fault) flows through
//! [`StatsAggregator::ingest`], which applies it to the attempt exactly
//! once, rolls the campaign counters, detects campaign completion, and
//! publishes refreshed progress to event subscribers.
//!
//! Event publication is fire-and-forget: a slow or absent subscriber never
//! blocks or fails outcome processing.

use std::sync::Arc;

use tracing::{debug, info};

use crate::campaign::{CampaignSnapshot, CampaignStatus};
use crate::database::{DatabaseManager, OutcomeApplication, OutcomeDisposition};
use crate::error::{DialerError, Result};
use crate::monitoring::{DialerEvent, DialerEventHub};
use crate::queue::{CallOutcome, RetryPolicy};

/// Applies call outcomes and maintains per-campaign statistics
///
/// Cheap to clone; instances share the database pool and event hub.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    db: Arc<DatabaseManager>,
    events: DialerEventHub,
    policy: RetryPolicy,
}

impl StatsAggregator {
    pub fn new(db: Arc<DatabaseManager>, events: DialerEventHub, policy: RetryPolicy) -> Self {
        Self { db, events, policy }
    }

    /// Apply one call outcome
    ///
    /// Duplicate and stale outcomes are absorbed without touching counters
    /// or publishing anything. Applied outcomes advance the attempt, roll
    /// the campaign counters, and emit a [`DialerEvent::CampaignProgress`]
    /// snapshot; the outcome that drains a running campaign's last open
    /// attempt also flips it to `COMPLETED`.
    ///
    /// The returned [`OutcomeApplication`] tells the caller whether a port
    /// still needs releasing; the aggregator itself never touches ports.
    pub async fn ingest(&self, outcome: &CallOutcome) -> Result<OutcomeApplication> {
        let application = self.db.apply_outcome_effects(outcome, &self.policy).await?;

        if !application.applied() {
            debug!(
                "Ignoring {:?} outcome for attempt {}",
                application.disposition, application.attempt_id
            );
            return Ok(application);
        }

        if let OutcomeDisposition::Exhausted { tries } = application.disposition {
            info!(
                "🚫 Attempt {} exhausted its retry budget after {} tries",
                application.attempt_id, tries
            );
            self.events.publish(DialerEvent::AttemptExhausted {
                campaign_id: application.campaign_id.clone(),
                attempt_id: application.attempt_id.clone(),
                tries,
                at: outcome.occurred_at,
            });
        }

        if application.attempt_terminal() {
            self.check_completion(&application.campaign_id).await?;
        }

        let snapshot = self.snapshot(&application.campaign_id).await?;
        self.events.publish(DialerEvent::CampaignProgress(snapshot));

        Ok(application)
    }

    /// Build the current progress snapshot for a campaign
    ///
    /// Progress counts only attempts that have reached a terminal state,
    /// so a campaign of three contacts reports 33, 66, then 100 percent as
    /// each one finishes.
    pub async fn snapshot(&self, campaign_id: &str) -> Result<CampaignSnapshot> {
        let campaign = self
            .db
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| {
                DialerError::not_found(format!("Campaign {} not found", campaign_id))
            })?;

        let completed = self.db.terminal_attempts(campaign_id).await?;
        let progress_percent = if campaign.total_attempts == 0 {
            0
        } else {
            (completed * 100 / campaign.total_attempts).min(100) as u8
        };

        Ok(CampaignSnapshot {
            campaign_id: campaign.id,
            name: campaign.name,
            status: campaign.status,
            total_attempts: campaign.total_attempts,
            answered: campaign.answered,
            transferred: campaign.transferred,
            failed: campaign.failed,
            completed_attempts: completed,
            progress_percent,
            updated_at: campaign.updated_at,
        })
    }

    /// Flip a running campaign to `COMPLETED` once no open attempts remain
    ///
    /// Concurrent outcome workers may race here; losing the status update
    /// just means another worker already completed the campaign. A paused
    /// or stopped campaign is left as-is even when fully drained.
    async fn check_completion(&self, campaign_id: &str) -> Result<()> {
        let outstanding = self.db.outstanding_attempts(campaign_id).await?;
        if outstanding > 0 {
            return Ok(());
        }

        let completed = self
            .db
            .campaign_status_cas(campaign_id, CampaignStatus::Running, CampaignStatus::Completed)
            .await?;

        if completed {
            info!("✅ Campaign {} completed: every attempt is terminal", campaign_id);
            self.events.campaign_state_changed(
                campaign_id,
                CampaignStatus::Running,
                CampaignStatus::Completed,
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::NewCampaign;
    use crate::database::CallAttempt;
    use crate::queue::OutcomeStatus;

    async fn seeded_campaign(db: &DatabaseManager, contacts: &[&str]) -> (String, Vec<CallAttempt>) {
        let new = NewCampaign {
            owner_id: "tenant-1".to_string(),
            name: "Stats test".to_string(),
            contact_list_id: "list-1".to_string(),
            greeting_reference: "custom/welcome".to_string(),
            transfer_number: Some("18005550100".to_string()),
            provider_id: None,
            port_selection: Vec::new(),
            contacts: contacts.iter().map(|c| c.to_string()).collect(),
        };

        let campaign_id = format!("camp-{}", uuid::Uuid::new_v4());
        let campaign = crate::campaign::Campaign::from_new(campaign_id.clone(), &new);

        let mut tx = db.begin_transaction().await.unwrap();
        db.insert_campaign_tx(&mut tx, &campaign).await.unwrap();
        let seeded = db
            .seed_attempts_tx(&mut tx, &campaign_id, &new.contacts)
            .await
            .unwrap();
        db.set_campaign_total_tx(&mut tx, &campaign_id, seeded)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        db.campaign_status_cas(&campaign_id, CampaignStatus::Created, CampaignStatus::Running)
            .await
            .unwrap();

        let attempts = db.list_attempts(&campaign_id).await.unwrap();
        (campaign_id, attempts)
    }

    fn aggregator(db: &Arc<DatabaseManager>) -> StatsAggregator {
        StatsAggregator::new(db.clone(), DialerEventHub::new(16), RetryPolicy::new())
    }

    #[tokio::test]
    async fn duplicate_outcome_counts_once() {
        let db = Arc::new(DatabaseManager::new_in_memory().await.unwrap());
        let stats = aggregator(&db);
        let (campaign_id, attempts) = seeded_campaign(&db, &["15550001111"]).await;

        db.dispatch_attempt_row(&attempts[0].id, "port-1").await.unwrap();

        let outcome = CallOutcome::new(&attempts[0].id, &campaign_id, 1, OutcomeStatus::Answered)
            .with_port("port-1");

        let first = stats.ingest(&outcome).await.unwrap();
        assert!(first.applied());
        assert_eq!(first.port_to_release.as_deref(), Some("port-1"));

        let second = stats.ingest(&outcome).await.unwrap();
        assert!(!second.applied());
        assert!(second.port_to_release.is_none());

        let campaign = db.get_campaign(&campaign_id).await.unwrap().unwrap();
        assert_eq!(campaign.answered, 1);
    }

    #[tokio::test]
    async fn last_terminal_attempt_completes_running_campaign() {
        let db = Arc::new(DatabaseManager::new_in_memory().await.unwrap());
        let stats = aggregator(&db);
        let (campaign_id, attempts) = seeded_campaign(&db, &["15550001111"]).await;

        db.dispatch_attempt_row(&attempts[0].id, "port-1").await.unwrap();
        let outcome =
            CallOutcome::new(&attempts[0].id, &campaign_id, 1, OutcomeStatus::Transferred);
        stats.ingest(&outcome).await.unwrap();

        let campaign = db.get_campaign(&campaign_id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Completed);
        assert_eq!(campaign.answered, 1);
        assert_eq!(campaign.transferred, 1);
    }

    #[tokio::test]
    async fn interim_failure_keeps_campaign_open() {
        let db = Arc::new(DatabaseManager::new_in_memory().await.unwrap());
        let stats = aggregator(&db);
        let (campaign_id, attempts) = seeded_campaign(&db, &["15550001111"]).await;

        db.dispatch_attempt_row(&attempts[0].id, "port-1").await.unwrap();
        let outcome = CallOutcome::new(&attempts[0].id, &campaign_id, 1, OutcomeStatus::Busy);
        let application = stats.ingest(&outcome).await.unwrap();

        assert!(matches!(
            application.disposition,
            OutcomeDisposition::Requeued { .. }
        ));

        let campaign = db.get_campaign(&campaign_id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Running);
        assert_eq!(campaign.failed, 0);

        let snapshot = stats.snapshot(&campaign_id).await.unwrap();
        assert_eq!(snapshot.progress_percent, 0);
    }

    #[tokio::test]
    async fn progress_tracks_terminal_attempts() {
        let db = Arc::new(DatabaseManager::new_in_memory().await.unwrap());
        let stats = aggregator(&db);
        let (campaign_id, attempts) =
            seeded_campaign(&db, &["15550001111", "15550002222", "15550003333"]).await;

        let mut expected = [33u8, 66, 100].into_iter();
        for attempt in &attempts {
            db.dispatch_attempt_row(&attempt.id, "port-1").await.unwrap();
            let outcome = CallOutcome::new(&attempt.id, &campaign_id, 1, OutcomeStatus::Answered);
            stats.ingest(&outcome).await.unwrap();

            let snapshot = stats.snapshot(&campaign_id).await.unwrap();
            assert_eq!(snapshot.progress_percent, expected.next().unwrap());
        }

        let campaign = db.get_campaign(&campaign_id).await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Completed);
    }

    #[tokio::test]
    async fn exhaustion_is_announced_to_subscribers() {
        let db = Arc::new(DatabaseManager::new_in_memory().await.unwrap());
        let events = DialerEventHub::new(16);
        let stats = StatsAggregator::new(db.clone(), events.clone(), RetryPolicy::new());
        let mut feed = events.subscribe();

        let (campaign_id, attempts) = seeded_campaign(&db, &["15550001111"]).await;

        // Burn through the full retry budget with failed calls. The
        // dispatch update only checks status, so the backoff window the
        // requeue wrote does not block the next iteration.
        for try_number in 1..=3 {
            db.dispatch_attempt_row(&attempts[0].id, "port-1").await.unwrap();
            let outcome =
                CallOutcome::new(&attempts[0].id, &campaign_id, try_number, OutcomeStatus::NoAnswer);
            stats.ingest(&outcome).await.unwrap();
        }

        let mut saw_exhausted = false;
        while let Ok(event) = feed.try_recv() {
            if let DialerEvent::AttemptExhausted { attempt_id, tries, .. } = event {
                assert_eq!(attempt_id, attempts[0].id);
                assert_eq!(tries, 3);
                saw_exhausted = true;
            }
        }
        assert!(saw_exhausted);

        let campaign = db.get_campaign(&campaign_id).await.unwrap().unwrap();
        assert_eq!(campaign.failed, 1);
        assert_eq!(campaign.status, CampaignStatus::Completed);
    }
}
