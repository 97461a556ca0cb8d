use serde::{Deserialize, Serialize};

use crate::error::{DialerError, Result};

/// Comprehensive dialer configuration
///
/// This is the main configuration structure for the campaign dialer,
/// covering campaign limits, scheduler pacing, monitoring cadence, and
/// persistent storage.
///
/// # Configuration Sections
///
/// - [`general`](DialerConfig::general): Campaign limits and gateway trunk naming
/// - [`scheduler`](DialerConfig::scheduler): Dispatch scan pacing and outcome workers
/// - [`monitoring`](DialerConfig::monitoring): Status reporting and event buffering
/// - [`database`](DialerConfig::database): Persistent storage location
///
/// # Examples
///
/// ## Default Configuration
///
/// ```
/// use outdial_dialer_engine::config::DialerConfig;
///
/// let config = DialerConfig::default();
/// assert_eq!(config.general.max_concurrent_campaigns, 16);
/// assert_eq!(config.scheduler.dispatch_interval_ms, 500);
/// ```
///
/// ## Custom Configuration
///
/// ```
/// use outdial_dialer_engine::config::DialerConfig;
///
/// let mut config = DialerConfig::default();
///
/// // Tighten the dispatch loop for a small deployment
/// config.scheduler.dispatch_interval_ms = 250;
/// config.scheduler.max_dispatches_per_cycle = 2;
///
/// config.validate().expect("Configuration should be valid");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialerConfig {
    /// General dialer settings including campaign limits and trunk naming
    pub general: GeneralConfig,

    /// Dispatch scheduler configuration
    pub scheduler: SchedulerConfig,

    /// Monitoring and status reporting configuration
    pub monitoring: MonitoringConfig,

    /// Database configuration for persistent storage
    pub database: DatabaseConfig,
}

/// General dialer system configuration
///
/// Core settings that affect overall dialer operation: how many campaigns
/// may run at once and how generated artifacts name the gateway trunks.
///
/// # Examples
///
/// ```
/// use outdial_dialer_engine::config::GeneralConfig;
///
/// let config = GeneralConfig::default();
/// assert_eq!(config.trunk_prefix, "goip_port");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Maximum number of campaigns that may be running at the same time
    ///
    /// Starting or resuming a campaign beyond this limit is rejected with
    /// a resource-unavailable error. Stopped, paused, and completed
    /// campaigns do not count against the limit.
    pub max_concurrent_campaigns: usize,

    /// Prefix used to name gateway trunks in generated dialplans
    ///
    /// A port with number 3 is addressed as `<trunk_prefix>3` in transfer
    /// dial strings, e.g. `SIP/goip_port3/18005550100`.
    pub trunk_prefix: String,

    /// Seconds the transfer leg is allowed to ring before giving up
    ///
    /// Embedded in the generated dialplan's transfer Dial step.
    pub transfer_timeout_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            max_concurrent_campaigns: 16,
            trunk_prefix: "goip_port".to_string(),
            transfer_timeout_secs: 30,
        }
    }
}

/// Dispatch scheduler configuration
///
/// Controls how often the dialer scans running campaigns for due call
/// attempts and how aggressively it dispatches them.
///
/// Retry pacing for failed calls is a fixed policy and deliberately not
/// configurable here; see [`crate::queue::RetryPolicy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Milliseconds between dispatch scans over running campaigns
    ///
    /// Each scan picks up due call attempts and claims ports for them.
    /// Lower values reduce dial latency but increase database traffic.
    pub dispatch_interval_ms: u64,

    /// Maximum attempts dispatched per campaign in a single scan
    ///
    /// Bounds the burst a single campaign can place on the port pool so
    /// one large campaign cannot starve the others between scans.
    pub max_dispatches_per_cycle: usize,

    /// Number of workers draining the call outcome feed
    pub outcome_workers: usize,

    /// Seconds between retry sweeps over failed port releases
    ///
    /// A port release that hits a database error is parked and retried on
    /// this cadence until it succeeds; releases are never dropped.
    pub release_retry_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: 500,
            max_dispatches_per_cycle: 4,
            outcome_workers: 2,
            release_retry_interval_secs: 5,
        }
    }
}

/// Monitoring and status reporting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Seconds between periodic engine status summaries in the log
    pub status_interval_secs: u64,

    /// Capacity of the broadcast channel carrying dialer events
    ///
    /// Slow subscribers that fall more than this many events behind start
    /// losing the oldest events; publishing never blocks on them.
    pub event_buffer: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: 10,
            event_buffer: 256,
        }
    }
}

/// Database configuration for persistent storage
///
/// # Database Path
///
/// - Empty string or ":memory:": in-memory database (not persistent)
/// - File path: persistent SQLite database stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path (empty string for in-memory)
    pub database_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_path: "outdial.db".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Build the sqlx connection URL for this configuration
    ///
    /// # Examples
    ///
    /// ```
    /// use outdial_dialer_engine::config::DatabaseConfig;
    ///
    /// let config = DatabaseConfig { database_path: ":memory:".to_string() };
    /// assert_eq!(config.database_url(), "sqlite::memory:");
    /// ```
    pub fn database_url(&self) -> String {
        if self.database_path.is_empty() || self.database_path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}", self.database_path)
        }
    }
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            scheduler: SchedulerConfig::default(),
            monitoring: MonitoringConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl DialerConfig {
    /// Validate the configuration for consistency and correctness
    ///
    /// # Examples
    ///
    /// ```
    /// use outdial_dialer_engine::config::DialerConfig;
    ///
    /// let mut config = DialerConfig::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.scheduler.dispatch_interval_ms = 0;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.general.max_concurrent_campaigns == 0 {
            return Err(DialerError::configuration(
                "max_concurrent_campaigns must be at least 1",
            ));
        }
        if self.general.trunk_prefix.is_empty() {
            return Err(DialerError::configuration("trunk_prefix cannot be empty"));
        }
        if self.general.trunk_prefix.chars().any(char::is_whitespace) {
            return Err(DialerError::configuration(
                "trunk_prefix cannot contain whitespace",
            ));
        }
        if self.general.transfer_timeout_secs == 0 {
            return Err(DialerError::configuration(
                "transfer_timeout_secs must be at least 1",
            ));
        }
        if self.scheduler.dispatch_interval_ms == 0 {
            return Err(DialerError::configuration(
                "dispatch_interval_ms must be at least 1",
            ));
        }
        if self.scheduler.max_dispatches_per_cycle == 0 {
            return Err(DialerError::configuration(
                "max_dispatches_per_cycle must be at least 1",
            ));
        }
        if self.scheduler.outcome_workers == 0 {
            return Err(DialerError::configuration(
                "outcome_workers must be at least 1",
            ));
        }
        if self.scheduler.release_retry_interval_secs == 0 {
            return Err(DialerError::configuration(
                "release_retry_interval_secs must be at least 1",
            ));
        }
        if self.monitoring.status_interval_secs == 0 {
            return Err(DialerError::configuration(
                "status_interval_secs must be at least 1",
            ));
        }
        if self.monitoring.event_buffer < 8 {
            return Err(DialerError::configuration(
                "event_buffer must be at least 8",
            ));
        }
        Ok(())
    }
}
