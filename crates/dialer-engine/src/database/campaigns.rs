//! # Async Campaign Database Operations
//!
//! Campaign persistence, lifecycle transitions, and dashboard counters.
//! Status changes go through a compare-and-swap on the current status so
//! concurrent control calls cannot skip states.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Row, Sqlite, Transaction};
use tracing::debug;

use super::DatabaseManager;
use crate::campaign::{Campaign, CampaignStatus};
use crate::error::{DialerError, Result};
use crate::queue::OutcomeStatus;

/// Counter increments produced by one applied outcome
///
/// Transferred calls were necessarily answered, so a transfer bumps both
/// counters. Interim failures bump nothing; `failed` counts attempts whose
/// retry budget is spent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignCounterDelta {
    pub answered: u32,
    pub transferred: u32,
    pub failed: u32,
}

impl CampaignCounterDelta {
    /// Delta for one outcome, given whether it exhausted the attempt
    pub fn for_outcome(status: OutcomeStatus, exhausted: bool) -> Self {
        match status {
            OutcomeStatus::Answered => Self {
                answered: 1,
                ..Self::default()
            },
            OutcomeStatus::Transferred => Self {
                answered: 1,
                transferred: 1,
                ..Self::default()
            },
            OutcomeStatus::Busy | OutcomeStatus::NoAnswer | OutcomeStatus::Failed => {
                if exhausted {
                    Self {
                        failed: 1,
                        ..Self::default()
                    }
                } else {
                    Self::default()
                }
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

fn campaign_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Campaign> {
    let status_str: String = row.try_get("status")?;
    let status = CampaignStatus::from_str(&status_str)
        .ok_or_else(|| DialerError::database(format!("Unknown campaign status: {}", status_str)))?;

    // Port preferences are stored as a JSON array; tolerate missing or
    // malformed values rather than failing the whole read.
    let port_selection: Option<String> = row.try_get("port_selection")?;
    let port_selection = port_selection
        .as_deref()
        .map(|s| serde_json::from_str(s).unwrap_or_default())
        .unwrap_or_default();

    let total_attempts: i64 = row.try_get("total_attempts")?;
    let answered: i64 = row.try_get("answered")?;
    let transferred: i64 = row.try_get("transferred")?;
    let failed: i64 = row.try_get("failed")?;

    Ok(Campaign {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        name: row.try_get("name")?,
        status,
        contact_list_id: row.try_get("contact_list_id")?,
        greeting_reference: row.try_get("greeting_reference")?,
        transfer_number: row.try_get("transfer_number")?,
        provider_id: row.try_get("provider_id")?,
        port_selection,
        total_attempts: total_attempts.try_into().unwrap_or(0),
        answered: answered.try_into().unwrap_or(0),
        transferred: transferred.try_into().unwrap_or(0),
        failed: failed.try_into().unwrap_or(0),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl DatabaseManager {
    /// Insert a freshly created campaign inside an open transaction
    pub(crate) async fn insert_campaign_tx(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        campaign: &Campaign,
    ) -> Result<()> {
        let port_selection = if campaign.port_selection.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&campaign.port_selection)
                    .map_err(|e| DialerError::internal(format!("Bad port selection: {}", e)))?,
            )
        };

        sqlx::query(
            "INSERT INTO campaigns (
                 id, owner_id, name, status, contact_list_id, greeting_reference,
                 transfer_number, provider_id, port_selection, total_attempts,
                 answered, transferred, failed, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, ?, ?)",
        )
        .bind(&campaign.id)
        .bind(&campaign.owner_id)
        .bind(&campaign.name)
        .bind(campaign.status.as_str())
        .bind(&campaign.contact_list_id)
        .bind(&campaign.greeting_reference)
        .bind(&campaign.transfer_number)
        .bind(&campaign.provider_id)
        .bind(port_selection)
        .bind(campaign.total_attempts as i64)
        .bind(campaign.created_at)
        .bind(campaign.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Record the seeded attempt total on a campaign row
    pub(crate) async fn set_campaign_total_tx(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        campaign_id: &str,
        total_attempts: u32,
    ) -> Result<()> {
        sqlx::query("UPDATE campaigns SET total_attempts = ?, updated_at = ? WHERE id = ?")
            .bind(total_attempts as i64)
            .bind(Utc::now())
            .bind(campaign_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Fetch a single campaign by id
    pub async fn get_campaign(&self, campaign_id: &str) -> Result<Option<Campaign>> {
        let row = sqlx::query("SELECT * FROM campaigns WHERE id = ?")
            .bind(campaign_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| campaign_from_row(&r)).transpose()
    }

    /// List an owner's campaigns, newest first
    pub async fn list_campaigns(&self, owner_id: &str) -> Result<Vec<Campaign>> {
        let rows =
            sqlx::query("SELECT * FROM campaigns WHERE owner_id = ? ORDER BY created_at DESC")
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(campaign_from_row).collect()
    }

    /// Campaigns currently eligible for dispatch scans
    pub async fn running_campaigns(&self) -> Result<Vec<Campaign>> {
        let rows = sqlx::query(
            "SELECT * FROM campaigns WHERE status = 'RUNNING' ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(campaign_from_row).collect()
    }

    /// Number of campaigns currently running
    pub async fn running_campaign_count(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM campaigns WHERE status = 'RUNNING'")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n.try_into().unwrap_or(0))
    }

    /// Compare-and-swap a campaign's status
    ///
    /// Returns `true` when the transition landed; `false` means the status
    /// changed under us and the caller should re-read and re-evaluate.
    pub async fn campaign_status_cas(
        &self,
        campaign_id: &str,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE campaigns SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(campaign_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        let swapped = result.rows_affected() > 0;
        if swapped {
            debug!("Campaign {} moved {} -> {}", campaign_id, from, to);
        }
        Ok(swapped)
    }

    /// Apply counter increments inside an open transaction
    pub(crate) async fn add_campaign_counters_tx(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        campaign_id: &str,
        delta: &CampaignCounterDelta,
    ) -> Result<()> {
        if delta.is_zero() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE campaigns
             SET answered = answered + ?,
                 transferred = transferred + ?,
                 failed = failed + ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(delta.answered as i64)
        .bind(delta.transferred as i64)
        .bind(delta.failed as i64)
        .bind(Utc::now())
        .bind(campaign_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_counts_as_answered() {
        let delta = CampaignCounterDelta::for_outcome(OutcomeStatus::Transferred, false);
        assert_eq!(delta.answered, 1);
        assert_eq!(delta.transferred, 1);
        assert_eq!(delta.failed, 0);
    }

    #[test]
    fn interim_failure_counts_nothing() {
        for status in [
            OutcomeStatus::Busy,
            OutcomeStatus::NoAnswer,
            OutcomeStatus::Failed,
        ] {
            assert!(CampaignCounterDelta::for_outcome(status, false).is_zero());
        }
    }

    #[test]
    fn exhausted_failure_counts_once() {
        let delta = CampaignCounterDelta::for_outcome(OutcomeStatus::NoAnswer, true);
        assert_eq!(delta.failed, 1);
        assert_eq!(delta.answered, 0);
    }
}
