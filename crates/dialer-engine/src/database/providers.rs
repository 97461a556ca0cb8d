//! # Async SIP Provider Database Operations
//!
//! Providers carry the transfer leg of answered calls. The dialer only
//! stores their registration data; the generated SIP peer artifact is what
//! hands it to the switch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use super::DatabaseManager;
use crate::error::{DialerError, Result};

/// A SIP trunk provider used for call transfers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub owner_id: String,
    /// Human-readable name shown in listings
    pub label: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: String,
    pub created_at: DateTime<Utc>,
}

impl Provider {
    /// Build a persistable provider from registration parameters
    pub fn from_new(id: impl Into<String>, new: &NewProvider) -> Self {
        Provider {
            id: id.into(),
            owner_id: new.owner_id.clone(),
            label: new.label.clone(),
            host: new.host.clone(),
            port: new.port,
            username: new.username.clone(),
            secret: new.secret.clone(),
            created_at: Utc::now(),
        }
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self> {
        let port: i64 = row.try_get("port")?;
        Ok(Provider {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            label: row.try_get("label")?,
            host: row.try_get("host")?,
            port: port.try_into().map_err(|_| {
                DialerError::database(format!("Provider port out of range: {}", port))
            })?,
            username: row.try_get("username")?,
            secret: row.try_get("secret")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Parameters for registering a provider
#[derive(Debug, Clone)]
pub struct NewProvider {
    pub owner_id: String,
    pub label: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: String,
}

impl DatabaseManager {
    /// Persist a provider row
    pub async fn insert_provider(&self, provider: &Provider) -> Result<()> {
        sqlx::query(
            "INSERT INTO providers (id, owner_id, label, host, port, username, secret, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&provider.id)
        .bind(&provider.owner_id)
        .bind(&provider.label)
        .bind(&provider.host)
        .bind(provider.port as i64)
        .bind(&provider.username)
        .bind(&provider.secret)
        .bind(provider.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a single provider by id
    pub async fn get_provider(&self, provider_id: &str) -> Result<Option<Provider>> {
        let row = sqlx::query("SELECT * FROM providers WHERE id = ?")
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Provider::from_row(&r)).transpose()
    }

    /// List an owner's providers, oldest first
    pub async fn list_providers(&self, owner_id: &str) -> Result<Vec<Provider>> {
        let rows =
            sqlx::query("SELECT * FROM providers WHERE owner_id = ? ORDER BY created_at ASC")
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(Provider::from_row).collect()
    }
}
