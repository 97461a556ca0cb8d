//! # Async Call Attempt Database Operations
//!
//! The persistent per-campaign dial queue. An attempt's status moves
//! through conditional updates only, so a dispatch scan and an outcome
//! worker touching the same row cannot both win.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, Sqlite, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::DatabaseManager;
use crate::error::{DialerError, Result};
use crate::queue::AttemptStatus;

/// One queued call to one contact
///
/// Seeded when its campaign is created and driven to a terminal status by
/// the dispatch scheduler and the outcome feed. `attempts` counts consumed
/// tries and only ever grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAttempt {
    pub id: String,
    pub campaign_id: String,
    pub contact_phone: String,
    pub status: AttemptStatus,
    /// Tries consumed so far; capped by [`crate::queue::MAX_CALL_RETRIES`]
    pub attempts: u32,
    /// Port carrying the in-flight try, while one is dispatched
    pub port_id: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Earliest time the next try may dispatch, after a failed try
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CallAttempt {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        let status_str: String = row.try_get("status")?;
        let status = AttemptStatus::from_str(&status_str).ok_or_else(|| {
            DialerError::database(format!("Unknown attempt status: {}", status_str))
        })?;
        let attempts: i64 = row.try_get("attempts")?;
        Ok(CallAttempt {
            id: row.try_get("id")?,
            campaign_id: row.try_get("campaign_id")?,
            contact_phone: row.try_get("contact_phone")?,
            status,
            attempts: attempts.try_into().unwrap_or(0),
            port_id: row.try_get("port_id")?,
            last_attempt_at: row.try_get("last_attempt_at")?,
            next_attempt_at: row.try_get("next_attempt_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Attempt totals by status across the whole store
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AttemptCounts {
    pub queued: usize,
    pub dispatched: usize,
    pub succeeded: usize,
    /// Failed tries waiting out their backoff
    pub retrying: usize,
    pub permanently_failed: usize,
}

impl DatabaseManager {
    /// Seed one queued attempt per contact inside an open transaction
    pub(crate) async fn seed_attempts_tx(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        campaign_id: &str,
        contacts: &[String],
    ) -> Result<u32> {
        let now = Utc::now();
        for contact in contacts {
            let attempt_id = format!("att-{}", Uuid::new_v4());
            sqlx::query(
                "INSERT INTO call_attempts (id, campaign_id, contact_phone, status, attempts, created_at)
                 VALUES (?, ?, ?, 'QUEUED', 0, ?)",
            )
            .bind(&attempt_id)
            .bind(campaign_id)
            .bind(contact)
            .bind(now)
            .execute(&mut **tx)
            .await?;
        }
        Ok(contacts.len() as u32)
    }

    /// Fetch a single attempt by id
    pub async fn get_attempt(&self, attempt_id: &str) -> Result<Option<CallAttempt>> {
        let row = sqlx::query("SELECT * FROM call_attempts WHERE id = ?")
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| CallAttempt::from_row(&r)).transpose()
    }

    /// All attempts for a campaign, oldest first
    pub async fn list_attempts(&self, campaign_id: &str) -> Result<Vec<CallAttempt>> {
        let rows = sqlx::query(
            "SELECT * FROM call_attempts WHERE campaign_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(CallAttempt::from_row).collect()
    }

    /// Attempts ready to dispatch for one campaign
    ///
    /// Due means queued, or failed with its backoff window elapsed.
    /// Ordered so the longest-waiting attempt goes first.
    pub async fn due_attempts(&self, campaign_id: &str, limit: usize) -> Result<Vec<CallAttempt>> {
        let rows = sqlx::query(
            "SELECT * FROM call_attempts
             WHERE campaign_id = ?
               AND status IN ('QUEUED', 'FAILED')
               AND (next_attempt_at IS NULL OR next_attempt_at <= ?)
             ORDER BY COALESCE(next_attempt_at, created_at) ASC, id ASC
             LIMIT ?",
        )
        .bind(campaign_id)
        .bind(Utc::now())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(CallAttempt::from_row).collect()
    }

    /// Atomically move a due attempt to DISPATCHED and record its port
    ///
    /// Conditional on the attempt still being dispatchable; returns `false`
    /// when another scan got there first.
    pub async fn dispatch_attempt_row(&self, attempt_id: &str, port_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE call_attempts
             SET status = 'DISPATCHED',
                 attempts = attempts + 1,
                 last_attempt_at = ?,
                 next_attempt_at = NULL,
                 port_id = ?
             WHERE id = ? AND status IN ('QUEUED', 'FAILED')",
        )
        .bind(Utc::now())
        .bind(port_id)
        .bind(attempt_id)
        .execute(&self.pool)
        .await?;

        let dispatched = result.rows_affected() > 0;
        if dispatched {
            debug!("Attempt {} dispatched on port {}", attempt_id, port_id);
        }
        Ok(dispatched)
    }

    /// Read an attempt inside an open transaction
    pub(crate) async fn get_attempt_tx(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        attempt_id: &str,
    ) -> Result<Option<CallAttempt>> {
        let row = sqlx::query("SELECT * FROM call_attempts WHERE id = ?")
            .bind(attempt_id)
            .fetch_optional(&mut **tx)
            .await?;
        row.map(|r| CallAttempt::from_row(&r)).transpose()
    }

    /// Close a dispatched attempt as succeeded
    pub(crate) async fn succeed_attempt_tx(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        attempt_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE call_attempts SET status = 'SUCCEEDED', port_id = NULL
             WHERE id = ? AND status = 'DISPATCHED'",
        )
        .bind(attempt_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Put a dispatched attempt back in the queue with a backoff window
    pub(crate) async fn requeue_attempt_tx(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        attempt_id: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE call_attempts
             SET status = 'FAILED', next_attempt_at = ?, port_id = NULL
             WHERE id = ? AND status = 'DISPATCHED'",
        )
        .bind(next_attempt_at)
        .bind(attempt_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Close a dispatched attempt as permanently failed
    pub(crate) async fn exhaust_attempt_tx(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        attempt_id: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE call_attempts SET status = 'PERMANENTLY_FAILED', port_id = NULL
             WHERE id = ? AND status = 'DISPATCHED'",
        )
        .bind(attempt_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of attempts that have not yet reached a terminal status
    pub async fn outstanding_attempts(&self, campaign_id: &str) -> Result<u32> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM call_attempts
             WHERE campaign_id = ? AND status IN ('QUEUED', 'DISPATCHED', 'FAILED')",
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n.try_into().unwrap_or(0))
    }

    /// Number of attempts that reached a terminal status
    pub async fn terminal_attempts(&self, campaign_id: &str) -> Result<u32> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM call_attempts
             WHERE campaign_id = ? AND status IN ('SUCCEEDED', 'PERMANENTLY_FAILED')",
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n.try_into().unwrap_or(0))
    }

    /// Store-wide attempt totals by status
    pub async fn attempt_counts(&self) -> Result<AttemptCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM call_attempts GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = AttemptCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            let n = n.try_into().unwrap_or(0);
            match AttemptStatus::from_str(&status) {
                Some(AttemptStatus::Queued) => counts.queued = n,
                Some(AttemptStatus::Dispatched) => counts.dispatched = n,
                Some(AttemptStatus::Succeeded) => counts.succeeded = n,
                Some(AttemptStatus::Failed) => counts.retrying = n,
                Some(AttemptStatus::PermanentlyFailed) => counts.permanently_failed = n,
                None => {}
            }
        }
        Ok(counts)
    }
}
