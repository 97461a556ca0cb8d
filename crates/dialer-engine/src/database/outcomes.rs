//! # Outcome Ledger Operations
//!
//! Applies call outcome events to the store exactly once. Every applied
//! event leaves a row in `applied_outcomes` keyed by attempt, try number,
//! and outcome; a re-delivered event finds its ledger row and changes
//! nothing. Attempt finalization, counter increments, and the ledger row
//! land in one transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::campaigns::CampaignCounterDelta;
use super::DatabaseManager;
use crate::error::{DialerError, Result};
use crate::queue::{AttemptStatus, CallOutcome, RetryPolicy};

/// What one outcome event did to its attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeDisposition {
    /// Attempt closed successfully
    Succeeded,
    /// Try failed; attempt waits out its backoff before the next dispatch
    Requeued { next_attempt_at: DateTime<Utc> },
    /// Try failed with no retry budget left; attempt closed as failed
    Exhausted { tries: u32 },
    /// Event was already applied; nothing changed
    Duplicate,
    /// Event does not match an in-flight try; dropped
    Stale,
}

/// Result of feeding one outcome event through the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeApplication {
    pub attempt_id: String,
    pub campaign_id: String,
    /// Try number the event was applied against
    pub try_number: u32,
    pub disposition: OutcomeDisposition,
    /// Port to return to the pool, for freshly applied events only
    ///
    /// Always `None` for duplicates and stale events: the port may have
    /// been re-claimed since, and releasing it again would free someone
    /// else's call channel.
    pub port_to_release: Option<String>,
}

impl OutcomeApplication {
    /// Whether the event changed any state
    pub fn applied(&self) -> bool {
        !matches!(
            self.disposition,
            OutcomeDisposition::Duplicate | OutcomeDisposition::Stale
        )
    }

    /// Whether the attempt reached a terminal status with this event
    pub fn attempt_terminal(&self) -> bool {
        matches!(
            self.disposition,
            OutcomeDisposition::Succeeded | OutcomeDisposition::Exhausted { .. }
        )
    }
}

impl DatabaseManager {
    /// Apply one outcome event to its attempt, exactly once
    ///
    /// Runs the ledger insert, the attempt finalization, and the campaign
    /// counter increments in a single transaction. Port release is left to
    /// the caller so a release fault cannot roll back an applied outcome.
    pub async fn apply_outcome_effects(
        &self,
        outcome: &CallOutcome,
        policy: &RetryPolicy,
    ) -> Result<OutcomeApplication> {
        let mut tx = self.begin_transaction().await?;

        let Some(attempt) = self.get_attempt_tx(&mut tx, &outcome.attempt_id).await? else {
            tx.rollback().await?;
            return Err(DialerError::not_found(format!(
                "Attempt {} not found for outcome {}",
                outcome.attempt_id, outcome.status
            )));
        };

        // The ledger is consulted before anything else so an exact replay
        // always reports Duplicate, no matter where the attempt has moved
        // since the original application.
        let already_applied = sqlx::query(
            "SELECT 1 FROM applied_outcomes
             WHERE attempt_id = ? AND try_number = ? AND outcome = ?",
        )
        .bind(&attempt.id)
        .bind(outcome.try_number as i64)
        .bind(outcome.status.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .is_some();

        if already_applied {
            tx.rollback().await?;
            return Ok(OutcomeApplication {
                attempt_id: attempt.id,
                campaign_id: attempt.campaign_id,
                try_number: outcome.try_number,
                disposition: OutcomeDisposition::Duplicate,
                port_to_release: None,
            });
        }

        // Only a dispatched try is waiting for an outcome, and the event
        // must name that try: a late event for an earlier try arriving
        // after a re-dispatch would otherwise release the port carrying
        // the live call.
        if attempt.status != AttemptStatus::Dispatched
            || outcome.try_number != attempt.attempts
        {
            tx.rollback().await?;
            debug!(
                "Dropping stale {} outcome (try {}) for attempt {} in status {} (try {})",
                outcome.status, outcome.try_number, attempt.id, attempt.status, attempt.attempts
            );
            return Ok(OutcomeApplication {
                attempt_id: attempt.id,
                campaign_id: attempt.campaign_id,
                try_number: outcome.try_number,
                disposition: OutcomeDisposition::Stale,
                port_to_release: None,
            });
        }

        // The ledger insert is the idempotency gate under concurrency: two
        // workers racing the same event commit at most one row.
        let inserted = sqlx::query(
            "INSERT INTO applied_outcomes (attempt_id, try_number, outcome, applied_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT DO NOTHING",
        )
        .bind(&attempt.id)
        .bind(outcome.try_number as i64)
        .bind(outcome.status.as_str())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !inserted {
            tx.rollback().await?;
            return Ok(OutcomeApplication {
                attempt_id: attempt.id,
                campaign_id: attempt.campaign_id,
                try_number: outcome.try_number,
                disposition: OutcomeDisposition::Duplicate,
                port_to_release: None,
            });
        }

        let (disposition, delta) = if outcome.status.is_success() {
            self.succeed_attempt_tx(&mut tx, &attempt.id).await?;
            (
                OutcomeDisposition::Succeeded,
                CampaignCounterDelta::for_outcome(outcome.status, false),
            )
        } else {
            match policy.next_attempt_at(&attempt.id, attempt.attempts) {
                Ok(next_attempt_at) => {
                    self.requeue_attempt_tx(&mut tx, &attempt.id, next_attempt_at)
                        .await?;
                    (
                        OutcomeDisposition::Requeued { next_attempt_at },
                        CampaignCounterDelta::for_outcome(outcome.status, false),
                    )
                }
                Err(DialerError::RetryExhausted { .. }) => {
                    self.exhaust_attempt_tx(&mut tx, &attempt.id).await?;
                    (
                        OutcomeDisposition::Exhausted {
                            tries: attempt.attempts,
                        },
                        CampaignCounterDelta::for_outcome(outcome.status, true),
                    )
                }
                Err(e) => {
                    tx.rollback().await?;
                    return Err(e);
                }
            }
        };

        self.add_campaign_counters_tx(&mut tx, &attempt.campaign_id, &delta)
            .await?;

        tx.commit()
            .await
            .map_err(|e| DialerError::database(format!("Failed to commit outcome: {}", e)))?;

        // Prefer the port the switch reported; fall back to the one the
        // dispatcher recorded on the attempt.
        let port_to_release = outcome.port_id.clone().or(attempt.port_id);

        Ok(OutcomeApplication {
            attempt_id: attempt.id,
            campaign_id: attempt.campaign_id,
            try_number: attempt.attempts,
            disposition,
            port_to_release,
        })
    }
}
