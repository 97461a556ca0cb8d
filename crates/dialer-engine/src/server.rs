//! # Dialer Server Manager
//!
//! High-level server wrapper around the [`DialerEngine`]. It owns the
//! background tasks that keep a deployment moving: the dispatch scanner,
//! the outcome workers, the port janitor, and the status monitor, with
//! graceful startup and shutdown around all of them.
//!
//! ## Overview
//!
//! The engine itself is passive: campaigns only progress while something
//! calls [`DialerEngine::run_dispatch_cycle`] and drains the outcome feed.
//! `DialerServer` is that something. Construct it with a configuration and
//! a switch driver, call [`start`](DialerServer::start), and the engine
//! runs until [`stop`](DialerServer::stop).
//!
//! ## Background Tasks
//!
//! | Task | Interval | Work |
//! |------|----------|------|
//! | Dispatch | `scheduler.dispatch_interval_ms` | scan running campaigns, place calls |
//! | Outcome workers | event-driven | drain reported outcomes, apply them |
//! | Janitor | `scheduler.release_retry_interval_secs` | retry parked releases, sweep stuck ports |
//! | Monitor | `monitoring.status_interval_secs` | log an operational summary |
//!
//! ## Examples
//!
//! ### Basic Server Setup and Operation
//!
//! ```rust
//! use std::sync::Arc;
//! use outdial_dialer_engine::{
//!     config::DialerConfig,
//!     server::DialerServerBuilder,
//!     switch::LoopbackSwitch,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = DialerServerBuilder::new()
//!     .with_config(DialerConfig::default())
//!     .with_in_memory_database()
//!     .with_switch(Arc::new(LoopbackSwitch::new()))
//!     .build()
//!     .await?;
//!
//! server.start().await?;
//! println!("✅ Dialer server started");
//!
//! // Register capacity, create campaigns, start them...
//! let engine = server.engine();
//! engine.register_device("tenant-1", "gw-1", 8).await?;
//!
//! // Graceful shutdown when needed
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Production Setup with a Persistent Database
//!
//! ```rust
//! use std::sync::Arc;
//! use outdial_dialer_engine::{
//!     config::{DialerConfig, SchedulerConfig},
//!     server::DialerServerBuilder,
//!     switch::LoopbackSwitch,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DialerConfig {
//!     scheduler: SchedulerConfig {
//!         outcome_workers: 4,
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//!
//! let mut server = DialerServerBuilder::new()
//!     .with_config(config)
//!     .with_database_path("/var/lib/outdial/dialer.db".to_string())
//!     .with_switch(Arc::new(LoopbackSwitch::new()))
//!     .build()
//!     .await?;
//!
//! server.start().await?;
//!
//! // In production you would park here until shutdown:
//! // server.run().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};
use tracing::{debug, error, info};

use crate::config::DialerConfig;
use crate::error::{DialerError, Result};
use crate::orchestrator::core::DialerEngine;
use crate::ports::PortRegistry;
use crate::queue::CallOutcome;
use crate::switch::SwitchDriver;

/// Seconds a port may sit busy with no in-flight attempt before the
/// janitor returns it to the pool
const STUCK_PORT_GRACE_SECS: i64 = 300;

/// A complete dialer server that manages engine lifecycle and background tasks
pub struct DialerServer {
    /// The core dialer engine
    engine: Arc<DialerEngine>,

    /// Server configuration
    config: DialerConfig,

    /// Handle to the dispatch scanner task
    dispatch_handle: Option<JoinHandle<()>>,

    /// Handles to the outcome worker tasks
    outcome_handles: Vec<JoinHandle<()>>,

    /// Handle to the port janitor task
    janitor_handle: Option<JoinHandle<()>>,

    /// Handle to the status monitor task
    monitor_handle: Option<JoinHandle<()>>,
}

impl DialerServer {
    /// Create a server with the given configuration and switch driver
    pub async fn new(config: DialerConfig, switch: Arc<dyn SwitchDriver>) -> Result<Self> {
        let engine = DialerEngine::new(config.clone(), switch).await?;
        info!("✅ Dialer engine ready");

        Ok(Self {
            engine,
            config,
            dispatch_handle: None,
            outcome_handles: Vec::new(),
            janitor_handle: None,
            monitor_handle: None,
        })
    }

    /// Create a server backed by an in-memory database
    pub async fn new_in_memory(
        mut config: DialerConfig,
        switch: Arc<dyn SwitchDriver>,
    ) -> Result<Self> {
        config.database.database_path = ":memory:".to_string();
        Self::new(config, switch).await
    }

    /// Start every background task
    ///
    /// Can only be called once per server; the outcome feed is consumed by
    /// the first start.
    pub async fn start(&mut self) -> Result<()> {
        let feed = self
            .engine
            .take_outcome_feed()
            .ok_or_else(|| DialerError::internal("Server already started"))?;

        // Dispatch scanner
        let engine = self.engine.clone();
        let dispatch_interval = self.config.scheduler.dispatch_interval_ms;
        self.dispatch_handle = Some(tokio::spawn(async move {
            Self::dispatch_loop(engine, dispatch_interval).await;
        }));
        info!(
            "✅ Started dispatch scanner (every {}ms)",
            self.config.scheduler.dispatch_interval_ms
        );

        // Outcome workers share one receiver; whoever holds the lock takes
        // the next outcome, then releases the lock while applying it.
        let feed = Arc::new(Mutex::new(feed));
        for worker_id in 0..self.config.scheduler.outcome_workers {
            let engine = self.engine.clone();
            let feed = feed.clone();
            self.outcome_handles.push(tokio::spawn(async move {
                Self::outcome_worker_loop(engine, feed, worker_id).await;
            }));
        }
        info!(
            "✅ Started {} outcome worker(s)",
            self.config.scheduler.outcome_workers
        );

        // Port janitor
        let ports = self.engine.ports().clone();
        let janitor_interval = self.config.scheduler.release_retry_interval_secs;
        self.janitor_handle = Some(tokio::spawn(async move {
            Self::janitor_loop(ports, janitor_interval).await;
        }));

        // Status monitor
        let engine = self.engine.clone();
        let monitor_interval = self.config.monitoring.status_interval_secs;
        self.monitor_handle = Some(tokio::spawn(async move {
            Self::monitor_loop(engine, monitor_interval).await;
        }));

        info!("🚀 Dialer server started");
        Ok(())
    }

    /// Stop the server gracefully
    ///
    /// Cancels every background task. Campaign and attempt state lives in
    /// the database, so a later server picks up exactly where this one
    /// stopped.
    pub async fn stop(&mut self) -> Result<()> {
        info!("🛑 Stopping dialer server...");

        if let Some(handle) = self.dispatch_handle.take() {
            handle.abort();
            let _ = handle.await;
        }
        for handle in self.outcome_handles.drain(..) {
            handle.abort();
            let _ = handle.await;
        }
        if let Some(handle) = self.janitor_handle.take() {
            handle.abort();
            let _ = handle.await;
        }
        if let Some(handle) = self.monitor_handle.take() {
            handle.abort();
            let _ = handle.await;
        }

        info!("✅ Dialer server stopped");
        Ok(())
    }

    /// Run the server indefinitely
    pub async fn run(&self) -> Result<()> {
        info!("📞 Dialer server is running");
        self.display_info();

        loop {
            sleep(Duration::from_secs(60)).await;

            match self.engine.get_stats().await {
                Ok(stats) => stats.log_summary(),
                Err(e) => error!("Failed to read engine stats: {}", e),
            }
        }
    }

    /// Get a reference to the engine (for advanced usage)
    pub fn engine(&self) -> &Arc<DialerEngine> {
        &self.engine
    }

    /// Server configuration
    pub fn config(&self) -> &DialerConfig {
        &self.config
    }

    /// Display server information
    fn display_info(&self) {
        println!("\n📞 DIALER IS READY!");
        println!("===================");
        println!("\n🔧 Configuration:");
        println!("  - Database: {}", self.config.database.database_url());
        println!(
            "  - Dispatch every {}ms, up to {} calls per campaign per cycle",
            self.config.scheduler.dispatch_interval_ms,
            self.config.scheduler.max_dispatches_per_cycle
        );
        println!(
            "  - {} outcome worker(s), janitor every {}s",
            self.config.scheduler.outcome_workers,
            self.config.scheduler.release_retry_interval_secs
        );
        println!("\n🛑 Press Ctrl+C to stop the server\n");
    }

    /// Internal dispatch loop
    async fn dispatch_loop(engine: Arc<DialerEngine>, interval_ms: u64) {
        let mut ticker = interval(Duration::from_millis(interval_ms));

        loop {
            ticker.tick().await;

            match engine.run_dispatch_cycle().await {
                Ok(0) => {}
                Ok(n) => debug!("Dispatch cycle placed {} call(s)", n),
                Err(e) => error!("Dispatch cycle failed: {}", e),
            }
        }
    }

    /// Internal outcome worker loop
    async fn outcome_worker_loop(
        engine: Arc<DialerEngine>,
        feed: Arc<Mutex<mpsc::UnboundedReceiver<CallOutcome>>>,
        worker_id: usize,
    ) {
        loop {
            let outcome = {
                let mut rx = feed.lock().await;
                rx.recv().await
            };

            match outcome {
                Some(outcome) => {
                    if let Err(e) = engine.apply_outcome(&outcome).await {
                        error!(
                            "Outcome worker {} failed to apply outcome for attempt {}: {}",
                            worker_id, outcome.attempt_id, e
                        );
                    }
                }
                None => {
                    debug!("Outcome feed closed; worker {} exiting", worker_id);
                    break;
                }
            }
        }
    }

    /// Internal janitor loop for port hygiene
    async fn janitor_loop(ports: PortRegistry, interval_secs: u64) {
        let mut ticker = interval(Duration::from_secs(interval_secs));

        loop {
            ticker.tick().await;

            let landed = ports.retry_pending_releases().await;
            if landed > 0 {
                info!("🔓 Janitor landed {} parked release(s)", landed);
            }

            match ports.sweep_stuck(STUCK_PORT_GRACE_SECS).await {
                Ok(0) => {}
                Ok(n) => info!("🧹 Janitor swept {} stuck port(s)", n),
                Err(e) => error!("Stuck port sweep failed: {}", e),
            }
        }
    }

    /// Internal status monitor loop
    async fn monitor_loop(engine: Arc<DialerEngine>, interval_secs: u64) {
        let mut ticker = interval(Duration::from_secs(interval_secs));

        loop {
            ticker.tick().await;

            match engine.get_stats().await {
                Ok(stats) => stats.log_summary(),
                Err(e) => error!("Failed to read engine stats: {}", e),
            }
        }
    }
}

/// Builder for [`DialerServer`] with fluent API
pub struct DialerServerBuilder {
    config: Option<DialerConfig>,
    db_path: Option<String>,
    switch: Option<Arc<dyn SwitchDriver>>,
}

impl DialerServerBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: None,
            db_path: None,
            switch: None,
        }
    }

    /// Set the configuration
    pub fn with_config(mut self, config: DialerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the database path
    pub fn with_database_path(mut self, path: String) -> Self {
        self.db_path = Some(path);
        self
    }

    /// Use an in-memory database
    pub fn with_in_memory_database(mut self) -> Self {
        self.db_path = Some(":memory:".to_string());
        self
    }

    /// Set the switch driver
    pub fn with_switch(mut self, switch: Arc<dyn SwitchDriver>) -> Self {
        self.switch = Some(switch);
        self
    }

    /// Build the server
    pub async fn build(self) -> Result<DialerServer> {
        let mut config = self
            .config
            .ok_or_else(|| DialerError::configuration("Configuration not provided"))?;
        let switch = self
            .switch
            .ok_or_else(|| DialerError::configuration("Switch driver not provided"))?;

        if let Some(path) = self.db_path {
            config.database.database_path = path;
        }

        DialerServer::new(config, switch).await
    }
}

impl Default for DialerServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switch::LoopbackSwitch;

    #[tokio::test]
    async fn builder_requires_config() {
        let result = DialerServerBuilder::new()
            .with_switch(Arc::new(LoopbackSwitch::new()))
            .build()
            .await;
        assert!(matches!(result, Err(DialerError::Configuration(_))));
    }

    #[tokio::test]
    async fn builder_requires_switch() {
        let result = DialerServerBuilder::new()
            .with_config(DialerConfig::default())
            .build()
            .await;
        assert!(matches!(result, Err(DialerError::Configuration(_))));
    }

    #[tokio::test]
    async fn server_starts_once() {
        let mut server = DialerServerBuilder::new()
            .with_config(DialerConfig::default())
            .with_in_memory_database()
            .with_switch(Arc::new(LoopbackSwitch::new()))
            .build()
            .await
            .unwrap();

        server.start().await.unwrap();
        assert!(matches!(
            server.start().await,
            Err(DialerError::Internal(_))
        ));
        server.stop().await.unwrap();
    }
}
