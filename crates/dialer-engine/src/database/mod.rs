//! # Async Database Management (sqlx + SQLite)
//!
//! This module provides the persistent store for the dialer, built on sqlx
//! with SQLite. It exposes a fully async, Send-safe interface that works
//! seamlessly with `tokio::spawn`.
//!
//! ## Key Features
//!
//! - **Fully Async**: No `spawn_blocking`, all operations are naturally async
//! - **Atomic Handoffs**: Port claims and attempt dispatches use conditional
//!   updates so concurrent claimers can never double-allocate
//! - **Transaction Support**: Outcome application runs in a single transaction
//! - **Connection Pooling**: Built-in pooling for file-backed databases
//!
//! ## Quick Start
//!
//! ```rust
//! use outdial_dialer_engine::database::DatabaseManager;
//!
//! # async fn example() -> outdial_dialer_engine::Result<()> {
//! // Create database manager
//! let db = DatabaseManager::new("sqlite:outdial.db").await?;
//!
//! // All operations are Send-safe and can be used in tokio::spawn
//! tokio::spawn(async move {
//!     let counts = db.port_counts("tenant-1").await?;
//!     println!("{} ports available", counts.available);
//!     outdial_dialer_engine::Result::Ok(())
//! });
//! # Ok(())
//! # }
//! ```

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::error::{DialerError, Result};

mod attempts;
mod campaigns;
mod outcomes;
mod ports;
mod providers;

pub use attempts::{AttemptCounts, CallAttempt};
pub use campaigns::CampaignCounterDelta;
pub use outcomes::{OutcomeApplication, OutcomeDisposition};
pub use ports::{Port, PortCounts, PortStatus};
pub use providers::{NewProvider, Provider};

// Re-export commonly used types
pub use chrono;
pub use sqlx;

/// Main database manager using sqlx for async operations
#[derive(Debug, Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Create a new database manager with automatic migrations
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("🗄️ Initializing dialer database: {}", database_url);
        use std::str::FromStr;

        // Configure connection options for production performance
        let options = sqlx::sqlite::SqliteConnectOptions::from_str(database_url)
            .map_err(|e| DialerError::database(format!("Invalid database URL: {}", e)))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .create_if_missing(true);

        // An in-memory SQLite database lives and dies with its connection, so
        // pin a single long-lived connection or the schema vanishes between
        // pooled checkouts.
        let in_memory =
            database_url.contains(":memory:") || database_url.contains("mode=memory");
        let pool = if in_memory {
            sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
        } else {
            sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(10)
                .connect_with(options)
                .await
        }
        .map_err(|e| DialerError::database(format!("Failed to connect to database: {}", e)))?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DialerError::database(format!("Failed to run migrations: {}", e)))?;

        info!("✅ Database initialized (WAL mode enabled, migrations applied)");
        Ok(Self { pool })
    }

    /// Create an in-memory database for testing
    pub async fn new_in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a new database transaction
    pub async fn begin_transaction(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| DialerError::database(format!("Failed to start transaction: {}", e)))
    }
}
