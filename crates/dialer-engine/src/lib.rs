//! # Outdial Dialer Engine
//!
//! A campaign dialer orchestration engine for GSM gateway fleets. This
//! crate coordinates outbound dialing campaigns end to end: claiming
//! gateway ports, generating switch configuration, dispatching calls,
//! retrying failures with exponential backoff, and aggregating per-campaign
//! statistics in real time.
//!
//! ## Overview
//!
//! The dialer engine is the core of an outbound calling platform,
//! providing:
//!
//! - **Port Management**: Exclusive claims over gateway ports with fault
//!   flagging and automatic recovery of stuck channels
//! - **Config Artifact Generation**: Deterministic SIP peer and dialplan
//!   rendering for press-1 campaigns with live transfer
//! - **Call Queue & Retry Scheduling**: Per-contact attempt queues with a
//!   capped exponential backoff and a fixed retry budget
//! - **Campaign Lifecycle**: Start, pause, resume, and stop under a strict
//!   state machine, with automatic completion when the queue drains
//! - **Stats Aggregation**: Exactly-once outcome accounting, progress
//!   snapshots, and a broadcast event feed for dashboards
//! - **Database Integration**: Persistent storage with SQLite via sqlx;
//!   every contended decision is a conditional update, so any number of
//!   tasks can drive the engine safely
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐    ┌────────────────┐    ┌──────────────┐
//! │ Campaign Control │    │ Dispatch Cycle │    │ Outcome Feed │
//! └────────┬─────────┘    └───────┬────────┘    └──────┬───────┘
//!          │                      │                    │
//!          └──────────────────────┼────────────────────┘
//!                                 │
//!                        ┌────────────────┐
//!                        │  DialerEngine  │
//!                        └────────┬───────┘
//!          ┌──────────────────────┼────────────────────┐
//!          │                      │                    │
//! ┌────────┴───────┐    ┌─────────┴───────┐    ┌───────┴──────┐
//! │  PortRegistry  │    │ StatsAggregator │    │ SwitchDriver │
//! └────────┬───────┘    └─────────┬───────┘    └──────────────┘
//!          │                      │
//!          └──────────────────────┤
//!                                 │
//!                        ┌────────┴───────┐
//!                        │ SQLite (sqlx)  │
//!                        └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ### Basic Engine Setup
//!
//! ```
//! use outdial_dialer_engine::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! // Create configuration with sensible defaults
//! let mut config = DialerConfig::default();
//! config.database.database_path = ":memory:".to_string();
//!
//! // Create the engine with a loopback switch for this example
//! let engine = DialerEngine::new(config, Arc::new(LoopbackSwitch::new())).await?;
//!
//! println!("Dialer engine created successfully!");
//! # Ok(())
//! # }
//! ```
//!
//! ### Running a Campaign
//!
//! ```
//! use outdial_dialer_engine::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! # let mut config = DialerConfig::default();
//! # config.database.database_path = ":memory:".to_string();
//! # let engine = DialerEngine::new(config, Arc::new(LoopbackSwitch::new())).await?;
//! // Register a gateway with eight ports
//! engine.register_device("tenant-1", "gw-1", 8).await?;
//!
//! // Create a campaign: one call attempt per contact
//! let campaign = engine
//!     .create_campaign(NewCampaign {
//!         owner_id: "tenant-1".to_string(),
//!         name: "August promotion".to_string(),
//!         contact_list_id: "list-1".to_string(),
//!         greeting_reference: "custom/welcome".to_string(),
//!         transfer_number: Some("18005550100".to_string()),
//!         provider_id: None,
//!         port_selection: vec![],
//!         contacts: vec!["15550001111".to_string(), "15550002222".to_string()],
//!     })
//!     .await?;
//!
//! // Start it; a dispatch cycle (or the server's dispatch loop) does the rest
//! engine.start_campaign(&campaign.id).await?;
//! engine.run_dispatch_cycle().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Monitoring Progress
//!
//! ```
//! use outdial_dialer_engine::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! # let mut config = DialerConfig::default();
//! # config.database.database_path = ":memory:".to_string();
//! # let engine = DialerEngine::new(config, Arc::new(LoopbackSwitch::new())).await?;
//! # let campaign_id = String::new();
//! // Subscribe to live events
//! let mut events = engine.subscribe_events();
//!
//! // Or poll a snapshot on demand
//! let snapshot = engine.campaign_snapshot(&campaign_id).await?;
//! println!(
//!     "{}: {}% done, {} answered, {} transferred, {} failed",
//!     snapshot.name,
//!     snapshot.progress_percent,
//!     snapshot.answered,
//!     snapshot.transferred,
//!     snapshot.failed
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Modules
//!
//! - [`orchestrator`]: Core engine coordination, dispatch, and lifecycle
//! - [`ports`]: Gateway port registry with claims and fault handling
//! - [`campaign`]: Campaign types and the lifecycle state machine
//! - [`queue`]: Call attempts, outcomes, and the retry policy
//! - [`artifacts`]: Deterministic switch configuration rendering
//! - [`switch`]: The driver boundary to the telephony switch
//! - [`stats`]: Outcome aggregation and progress snapshots
//! - [`monitoring`]: Event broadcasting and operational metrics
//! - [`database`]: Persistent storage with SQLite via sqlx
//! - [`config`]: Configuration management and validation
//! - [`error`]: Error handling and result types
//!
//! ## Production Deployment
//!
//! For production deployments, consider:
//!
//! - **Database**: Use a dedicated database file with regular backups;
//!   in-memory databases are for tests and demos
//! - **Switch driver**: Implement [`switch::SwitchDriver`] against your
//!   switch and feed its call results back via `report_outcome`
//! - **Workers**: Size `scheduler.outcome_workers` to your outcome volume
//! - **Monitoring**: Subscribe to engine events for dashboards and alerts

// Core modules
pub mod config;
pub mod error;

// Dialer functionality modules
pub mod artifacts;
pub mod campaign;
pub mod monitoring;
pub mod orchestrator;
pub mod ports;
pub mod queue;
pub mod stats;
pub mod switch;

// External interfaces
pub mod server;

// Database integration
pub mod database;

// Re-exports for convenience
pub use config::DialerConfig;
pub use error::{DialerError, Result};

pub use orchestrator::core::DialerEngine;

pub use server::{DialerServer, DialerServerBuilder};

/// Prelude module for convenient imports
///
/// Import this module to get access to the most commonly used types:
///
/// ```
/// use outdial_dialer_engine::prelude::*;
/// ```
pub mod prelude {
    //! Commonly used types for dialer applications
    //!
    //! Re-exports the most frequently used items from the engine, making
    //! it easy to get started with a single import.

    pub use crate::{DialerConfig, DialerError, Result};
    pub use crate::orchestrator::core::DialerEngine;
    pub use crate::server::{DialerServer, DialerServerBuilder};

    // Configuration types
    pub use crate::config::{
        DatabaseConfig, GeneralConfig, MonitoringConfig, SchedulerConfig,
    };

    // Campaign types
    pub use crate::campaign::{
        Campaign, CampaignAction, CampaignSnapshot, CampaignStatus, NewCampaign,
    };

    // Queue and retry types
    pub use crate::queue::{
        AttemptStatus, CallAttempt, CallOutcome, OutcomeStatus, RetryPolicy, MAX_CALL_RETRIES,
    };

    // Port types
    pub use crate::ports::{Port, PortRegistry, PortStatus};

    // Artifact types
    pub use crate::artifacts::{generate_campaign_bundle, ConfigBundle};

    // Switch driver types
    pub use crate::switch::{DispatchInstruction, LoopbackSwitch, SwitchDriver};

    // Monitoring types
    pub use crate::monitoring::{DialerEvent, DialerEventHub, EngineStats};

    // Stats types
    pub use crate::stats::StatsAggregator;

    // Database types
    pub use crate::database::{
        DatabaseManager, NewProvider, OutcomeApplication, OutcomeDisposition, Provider,
    };

    // Common external types
    pub use chrono::{DateTime, Utc};
    pub use uuid::Uuid;
}
