use std::sync::Arc;

use chrono::Utc;
use dashmap::DashSet;
use tracing::{debug, info, warn};

use crate::database::{DatabaseManager, Port, PortCounts};
use crate::error::Result;
use crate::monitoring::{DialerEvent, DialerEventHub};

/// Single owner of gateway port state
///
/// All claims and releases funnel through here. The registry also parks
/// releases that hit a database fault and retries them until they land,
/// so a port can never leak out of the pool because of one bad write.
///
/// Cheap to clone; clones share the same parked-release set.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use outdial_dialer_engine::database::DatabaseManager;
/// use outdial_dialer_engine::monitoring::DialerEventHub;
/// use outdial_dialer_engine::ports::PortRegistry;
///
/// # async fn example() -> outdial_dialer_engine::Result<()> {
/// let db = Arc::new(DatabaseManager::new_in_memory().await?);
/// let registry = PortRegistry::new(db, DialerEventHub::new(64));
///
/// registry.sync_device("tenant-1", "gw1", 4).await?;
///
/// let port = registry.claim("tenant-1", "camp-1", None).await?;
/// assert!(port.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PortRegistry {
    db: Arc<DatabaseManager>,
    events: DialerEventHub,
    /// Port ids whose release failed and must be retried
    pending_releases: Arc<DashSet<String>>,
}

impl PortRegistry {
    pub fn new(db: Arc<DatabaseManager>, events: DialerEventHub) -> Self {
        Self {
            db,
            events,
            pending_releases: Arc::new(DashSet::new()),
        }
    }

    /// Register or refresh a gateway device's channels
    ///
    /// Creates one port row per channel, numbered 1..=`port_count`.
    /// Existing rows keep their runtime state, so re-registering a device
    /// mid-campaign does not free busy ports.
    pub async fn sync_device(
        &self,
        owner_id: &str,
        device_id: &str,
        port_count: u16,
    ) -> Result<Vec<Port>> {
        for number in 1..=port_count {
            let port_id = format!("{}-port-{}", device_id, number);
            self.db
                .upsert_port(&port_id, owner_id, device_id, number)
                .await?;
        }
        info!(
            "🔌 Device {} registered with {} port(s) for {}",
            device_id, port_count, owner_id
        );
        self.db.list_ports(owner_id).await
    }

    /// Claim a free port for a campaign
    ///
    /// Prefers `preferred_port_id` when it is available, otherwise takes
    /// the lowest-numbered available port. Returns `None` when the pool is
    /// empty; the caller is expected to try again on a later scan.
    ///
    /// Two concurrent claims can never receive the same port: the claim is
    /// a conditional update and exactly one contender wins each row.
    pub async fn claim(
        &self,
        owner_id: &str,
        campaign_id: &str,
        preferred_port_id: Option<&str>,
    ) -> Result<Option<Port>> {
        let claimed = self
            .db
            .claim_port_row(owner_id, campaign_id, preferred_port_id)
            .await?;

        match &claimed {
            Some(port) => {
                debug!(
                    "📞 Port {} (channel {}) claimed by campaign {}",
                    port.id, port.port_number, campaign_id
                );
            }
            None => {
                debug!("⏳ No free port for campaign {} right now", campaign_id);
            }
        }
        Ok(claimed)
    }

    /// Return a port to the pool
    ///
    /// Idempotent: releasing an already-available port is a no-op, and an
    /// errored port stays flagged until an explicit [`reset`](Self::reset).
    /// A database fault parks the release for the retry sweep instead of
    /// dropping it.
    pub async fn release(&self, port_id: &str) -> Result<()> {
        match self.db.release_port_row(port_id).await {
            Ok(true) => {
                debug!("🔓 Port {} released", port_id);
                self.pending_releases.remove(port_id);
            }
            Ok(false) => {
                // Not busy: already free, flagged, or unknown. All of
                // these are final as far as this release is concerned.
                self.pending_releases.remove(port_id);
                match self.db.get_port(port_id).await {
                    Ok(Some(port)) => debug!(
                        "🔓 Release of port {} was a no-op (status {})",
                        port_id, port.status
                    ),
                    Ok(None) => warn!("🔓 Release of unknown port {} dropped", port_id),
                    Err(e) => debug!("Port {} no-op release, lookup failed: {}", port_id, e),
                }
            }
            Err(e) => {
                warn!(
                    "⚠️ Release of port {} failed, parking for retry: {}",
                    port_id, e
                );
                self.pending_releases.insert(port_id.to_string());
            }
        }
        Ok(())
    }

    /// Flag a port as faulty and pull it from the pool
    pub async fn mark_error(&self, port_id: &str, reason: &str) -> Result<()> {
        self.db.mark_port_error_row(port_id).await?;
        self.pending_releases.remove(port_id);
        warn!("🚫 Port {} flagged as errored: {}", port_id, reason);
        self.events.publish(DialerEvent::PortFlagged {
            port_id: port_id.to_string(),
            reason: reason.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }

    /// Clear a port's error flag, returning it to the pool
    ///
    /// Returns `true` when the port was errored and is available again.
    pub async fn reset(&self, port_id: &str) -> Result<bool> {
        let reset = self.db.reset_port_row(port_id).await?;
        if reset {
            info!("✅ Port {} reset and back in the pool", port_id);
        }
        Ok(reset)
    }

    /// Retry every parked release; returns how many landed
    pub async fn retry_pending_releases(&self) -> usize {
        let parked: Vec<String> = self
            .pending_releases
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut released = 0;
        for port_id in parked {
            match self.db.release_port_row(&port_id).await {
                Ok(_) => {
                    self.pending_releases.remove(&port_id);
                    released += 1;
                    info!("🔓 Parked release of port {} finally landed", port_id);
                }
                Err(e) => {
                    debug!("Parked release of port {} still failing: {}", port_id, e);
                }
            }
        }
        released
    }

    /// Free busy ports whose call is long gone
    ///
    /// A crash between an applied outcome and its release can strand a
    /// port in BUSY. Anything busy past the grace window with no in-flight
    /// attempt gets swept back into the pool.
    pub async fn sweep_stuck(&self, grace_secs: i64) -> Result<usize> {
        let stuck = self.db.stuck_busy_ports(grace_secs).await?;
        let mut swept = 0;
        for port_id in stuck {
            if self.db.release_port_row(&port_id).await? {
                warn!("🧹 Swept stuck port {} back into the pool", port_id);
                swept += 1;
            }
        }
        Ok(swept)
    }

    /// Number of releases currently parked for retry
    pub fn pending_release_count(&self) -> usize {
        self.pending_releases.len()
    }

    /// Fetch one port
    pub async fn get(&self, port_id: &str) -> Result<Option<Port>> {
        self.db.get_port(port_id).await
    }

    /// List an owner's ports
    pub async fn list(&self, owner_id: &str) -> Result<Vec<Port>> {
        self.db.list_ports(owner_id).await
    }

    /// Per-status totals for one owner
    pub async fn counts(&self, owner_id: &str) -> Result<PortCounts> {
        self.db.port_counts(owner_id).await
    }
}
