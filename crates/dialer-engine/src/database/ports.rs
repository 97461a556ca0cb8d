//! # Async Port Database Operations
//!
//! Queries for the gateway port inventory. Port handoffs are conditional
//! updates keyed on the current status, so two claimers racing for the same
//! port can never both win.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use tracing::debug;

use super::DatabaseManager;
use crate::error::{DialerError, Result};

/// Port lifecycle states as stored in the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortStatus {
    /// Free for the next claim
    Available,
    /// Claimed by a campaign for an in-flight call
    Busy,
    /// Flagged faulty; excluded from claims until explicitly reset
    Error,
}

impl PortStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortStatus::Available => "AVAILABLE",
            PortStatus::Busy => "BUSY",
            PortStatus::Error => "ERROR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "AVAILABLE" => Some(PortStatus::Available),
            "BUSY" => Some(PortStatus::Busy),
            "ERROR" => Some(PortStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for PortStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single gateway voice channel
///
/// One row per physical channel on a registered gateway device. The
/// `port_number` is what generated dialplans use to address the channel's
/// trunk (for example `goip_port3`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub owner_id: String,
    pub device_id: String,
    pub port_number: u16,
    pub status: PortStatus,
    pub current_campaign_id: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Port {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        let status_str: String = row.try_get("status")?;
        let status = PortStatus::from_str(&status_str)
            .ok_or_else(|| DialerError::database(format!("Unknown port status: {}", status_str)))?;
        let port_number: i64 = row.try_get("port_number")?;
        Ok(Port {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            device_id: row.try_get("device_id")?,
            port_number: port_number.try_into().unwrap_or(0),
            status,
            current_campaign_id: row.try_get("current_campaign_id")?,
            last_used_at: row.try_get("last_used_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Per-status port totals for one owner
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PortCounts {
    pub available: usize,
    pub busy: usize,
    pub error: usize,
}

impl PortCounts {
    pub fn total(&self) -> usize {
        self.available + self.busy + self.error
    }
}

impl DatabaseManager {
    /// Insert or refresh a port row for a device channel
    ///
    /// Re-registering an existing port updates its identity columns but
    /// leaves runtime state (status, current campaign) untouched.
    pub async fn upsert_port(
        &self,
        port_id: &str,
        owner_id: &str,
        device_id: &str,
        port_number: u16,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO ports (id, owner_id, device_id, port_number, status, created_at)
             VALUES (?, ?, ?, ?, 'AVAILABLE', ?)
             ON CONFLICT(id) DO UPDATE SET
                 owner_id = excluded.owner_id,
                 device_id = excluded.device_id,
                 port_number = excluded.port_number",
        )
        .bind(port_id)
        .bind(owner_id)
        .bind(device_id)
        .bind(port_number as i64)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a single port by id
    pub async fn get_port(&self, port_id: &str) -> Result<Option<Port>> {
        let row = sqlx::query("SELECT * FROM ports WHERE id = ?")
            .bind(port_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Port::from_row(&r)).transpose()
    }

    /// List every port registered to an owner, ordered by device and channel
    pub async fn list_ports(&self, owner_id: &str) -> Result<Vec<Port>> {
        let rows = sqlx::query(
            "SELECT * FROM ports WHERE owner_id = ? ORDER BY device_id ASC, port_number ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Port::from_row).collect()
    }

    /// Atomically claim one available port for a campaign
    ///
    /// The claim is a conditional update on `status = 'AVAILABLE'`; losing a
    /// race for a candidate simply rescans for the next one. Returns `None`
    /// when the owner has no available port, which is an expected condition
    /// under load rather than an error.
    pub async fn claim_port_row(
        &self,
        owner_id: &str,
        campaign_id: &str,
        preferred_port_id: Option<&str>,
    ) -> Result<Option<Port>> {
        let preferred = preferred_port_id.unwrap_or("");
        loop {
            let candidate = sqlx::query(
                "SELECT id FROM ports
                 WHERE owner_id = ? AND status = 'AVAILABLE'
                 ORDER BY CASE WHEN id = ? THEN 0 ELSE 1 END, port_number ASC
                 LIMIT 1",
            )
            .bind(owner_id)
            .bind(preferred)
            .fetch_optional(&self.pool)
            .await?;

            let Some(row) = candidate else {
                return Ok(None);
            };
            let port_id: String = row.try_get("id")?;

            let claimed = sqlx::query(
                "UPDATE ports
                 SET status = 'BUSY', current_campaign_id = ?, last_used_at = ?
                 WHERE id = ? AND status = 'AVAILABLE'",
            )
            .bind(campaign_id)
            .bind(Utc::now())
            .bind(&port_id)
            .execute(&self.pool)
            .await?;

            if claimed.rows_affected() > 0 {
                let port = self.get_port(&port_id).await?.ok_or_else(|| {
                    DialerError::internal(format!("Port {} vanished after claim", port_id))
                })?;
                debug!("Port {} claimed for campaign {}", port_id, campaign_id);
                return Ok(Some(port));
            }
            // Lost the race for this candidate; rescan for another port.
        }
    }

    /// Return a busy port to the available pool
    ///
    /// Returns `true` when this call performed the release. `false` means
    /// the port was not busy (already released, or flagged as errored) and
    /// nothing changed.
    pub async fn release_port_row(&self, port_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE ports
             SET status = 'AVAILABLE', current_campaign_id = NULL, last_used_at = ?
             WHERE id = ? AND status = 'BUSY'",
        )
        .bind(Utc::now())
        .bind(port_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Flag a port as faulty and drop any campaign association
    pub async fn mark_port_error_row(&self, port_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE ports SET status = 'ERROR', current_campaign_id = NULL WHERE id = ?",
        )
        .bind(port_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DialerError::not_found(format!("Port {} not found", port_id)));
        }
        Ok(())
    }

    /// Clear an error flag, returning the port to the available pool
    ///
    /// Returns `true` when the port was errored and is now available again.
    pub async fn reset_port_row(&self, port_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE ports
             SET status = 'AVAILABLE', current_campaign_id = NULL
             WHERE id = ? AND status = 'ERROR'",
        )
        .bind(port_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Per-status totals for an owner's port pool
    pub async fn port_counts(&self, owner_id: &str) -> Result<PortCounts> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM ports WHERE owner_id = ? GROUP BY status",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = PortCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            let n = n.try_into().unwrap_or(0);
            match PortStatus::from_str(&status) {
                Some(PortStatus::Available) => counts.available = n,
                Some(PortStatus::Busy) => counts.busy = n,
                Some(PortStatus::Error) => counts.error = n,
                None => {}
            }
        }
        Ok(counts)
    }

    /// Per-status totals across every registered port
    pub async fn all_port_counts(&self) -> Result<PortCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM ports GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = PortCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            let n = n.try_into().unwrap_or(0);
            match PortStatus::from_str(&status) {
                Some(PortStatus::Available) => counts.available = n,
                Some(PortStatus::Busy) => counts.busy = n,
                Some(PortStatus::Error) => counts.error = n,
                None => {}
            }
        }
        Ok(counts)
    }

    /// Busy ports with no in-flight attempt that have sat idle past the grace window
    ///
    /// These are leaks: the call that claimed them finished but the release
    /// never landed (crash between outcome commit and release, for example).
    pub async fn stuck_busy_ports(&self, grace_secs: i64) -> Result<Vec<String>> {
        let cutoff = Utc::now() - chrono::Duration::seconds(grace_secs);
        let rows = sqlx::query(
            "SELECT id FROM ports
             WHERE status = 'BUSY'
               AND (last_used_at IS NULL OR last_used_at < ?)
               AND id NOT IN (
                   SELECT port_id FROM call_attempts
                   WHERE status = 'DISPATCHED' AND port_id IS NOT NULL
               )",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("id").map_err(DialerError::from))
            .collect()
    }
}
