//! # Engine Core
//!
//! Construction and the read/registration surface of the dialer engine.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────────┐
//!                    │   DialerEngine   │
//!                    └────────┬─────────┘
//!          ┌──────────────┬─────┴────┬──────────────┐
//!          ▼              ▼          ▼              ▼
//!   ┌──────────────┐ ┌──────────┐ ┌────────┐ ┌──────────────┐
//!   │ PortRegistry │ │ Database │ │ Stats  │ │ SwitchDriver │
//!   │   (claims)   │ │ (SQLite) │ │ (agg.) │ │  (dispatch)  │
//!   └──────────────┘ └──────────┘ └────────┘ └──────────────┘
//! ```
//!
//! One engine instance serves every campaign. Handles are shared by
//! wrapping the engine in an [`Arc`]; the background loops the server
//! spawns all clone from the same instance.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::info;
use uuid::Uuid;

use crate::campaign::{Campaign, CampaignSnapshot};
use crate::config::DialerConfig;
use crate::database::{DatabaseManager, NewProvider, Provider};
use crate::error::Result;
use crate::monitoring::{DialerEvent, DialerEventHub, EngineStats};
use crate::ports::{Port, PortRegistry};
use crate::queue::{CallOutcome, RetryPolicy};
use crate::stats::StatsAggregator;
use crate::switch::SwitchDriver;

/// Central orchestrator for outbound dialing campaigns
///
/// Owns every subsystem and is the only type callers need to hold. See the
/// sibling modules for the operations grouped by concern.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use outdial_dialer_engine::config::DialerConfig;
/// use outdial_dialer_engine::orchestrator::core::DialerEngine;
/// use outdial_dialer_engine::switch::LoopbackSwitch;
///
/// # async fn example() -> outdial_dialer_engine::error::Result<()> {
/// let mut config = DialerConfig::default();
/// config.database.database_path = ":memory:".to_string();
///
/// let engine = DialerEngine::new(config, Arc::new(LoopbackSwitch::new())).await?;
/// let ports = engine.register_device("tenant-1", "gw-1", 8).await?;
/// assert_eq!(ports.len(), 8);
/// # Ok(())
/// # }
/// ```
pub struct DialerEngine {
    pub(super) config: DialerConfig,
    pub(super) db: Arc<DatabaseManager>,
    pub(super) ports: PortRegistry,
    pub(super) events: DialerEventHub,
    pub(super) stats: StatsAggregator,
    pub(super) switch: Arc<dyn SwitchDriver>,
    /// Producer side of the outcome feed handed to `report_outcome`
    pub(super) outcome_tx: mpsc::UnboundedSender<CallOutcome>,
    /// Consumer side, taken once by the server's outcome workers
    pub(super) outcome_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<CallOutcome>>>,
}

impl DialerEngine {
    /// Create an engine backed by the configured database and switch driver
    ///
    /// Validates the configuration, opens the database (running migrations
    /// as needed), and wires the subsystems. The returned engine is idle;
    /// nothing dials until campaigns start and a dispatch loop runs.
    pub async fn new(config: DialerConfig, switch: Arc<dyn SwitchDriver>) -> Result<Arc<Self>> {
        config.validate()?;

        let db = Arc::new(DatabaseManager::new(&config.database.database_url()).await?);
        let events = DialerEventHub::new(config.monitoring.event_buffer);
        let ports = PortRegistry::new(db.clone(), events.clone());
        let stats = StatsAggregator::new(db.clone(), events.clone(), RetryPolicy::new());
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

        info!("📞 Dialer engine initialized (db: {})", config.database.database_url());

        Ok(Arc::new(Self {
            config,
            db,
            ports,
            events,
            stats,
            switch,
            outcome_tx,
            outcome_rx: parking_lot::Mutex::new(Some(outcome_rx)),
        }))
    }

    /// Engine configuration
    pub fn config(&self) -> &DialerConfig {
        &self.config
    }

    /// Shared database handle
    pub fn database(&self) -> &Arc<DatabaseManager> {
        &self.db
    }

    /// Port registry (claims, releases, error flagging)
    pub fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    /// Subscribe to engine events
    ///
    /// Late subscribers can backfill with [`recent_events`](Self::recent_events).
    pub fn subscribe_events(&self) -> broadcast::Receiver<DialerEvent> {
        self.events.subscribe()
    }

    /// The most recent events, oldest first
    pub fn recent_events(&self, limit: usize) -> Vec<DialerEvent> {
        self.events.recent(limit)
    }

    /// Register (or resize) a gateway device, materializing its ports
    ///
    /// Idempotent: ports that already exist keep their runtime state.
    pub async fn register_device(
        &self,
        owner_id: &str,
        device_id: &str,
        port_count: u16,
    ) -> Result<Vec<Port>> {
        self.ports.sync_device(owner_id, device_id, port_count).await
    }

    /// Register a SIP provider for call transfers
    pub async fn register_provider(&self, new: NewProvider) -> Result<Provider> {
        let provider = Provider::from_new(format!("prov-{}", Uuid::new_v4()), &new);
        self.db.insert_provider(&provider).await?;
        info!(
            "🌐 Provider {} ({}) registered for {}",
            provider.id, provider.label, provider.owner_id
        );
        Ok(provider)
    }

    /// Fetch a provider by id
    pub async fn get_provider(&self, provider_id: &str) -> Result<Option<Provider>> {
        self.db.get_provider(provider_id).await
    }

    /// List an owner's providers
    pub async fn list_providers(&self, owner_id: &str) -> Result<Vec<Provider>> {
        self.db.list_providers(owner_id).await
    }

    /// Fetch a campaign by id
    pub async fn get_campaign(&self, campaign_id: &str) -> Result<Option<Campaign>> {
        self.db.get_campaign(campaign_id).await
    }

    /// List an owner's campaigns, newest first
    pub async fn list_campaigns(&self, owner_id: &str) -> Result<Vec<Campaign>> {
        self.db.list_campaigns(owner_id).await
    }

    /// Current progress snapshot for a campaign
    pub async fn campaign_snapshot(&self, campaign_id: &str) -> Result<CampaignSnapshot> {
        self.stats.snapshot(campaign_id).await
    }

    /// Store-wide operational statistics
    pub async fn get_stats(&self) -> Result<EngineStats> {
        Ok(EngineStats {
            running_campaigns: self.db.running_campaign_count().await?,
            attempts: self.db.attempt_counts().await?,
            ports: self.db.all_port_counts().await?,
            pending_releases: self.ports.pending_release_count(),
        })
    }
}
