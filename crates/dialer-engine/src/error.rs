use thiserror::Error;

use crate::campaign::{CampaignAction, CampaignStatus};

/// Comprehensive error types for dialer operations
///
/// This enum covers all error conditions that can occur while orchestrating
/// outbound campaigns, from port allocation to switch config generation and
/// campaign lifecycle management.
///
/// # Examples
///
/// ```
/// use outdial_dialer_engine::{DialerError, Result};
///
/// fn start_dialing() -> Result<()> {
///     // Simulate an exhausted port pool
///     Err(DialerError::resource_unavailable("No free port for campaign"))
/// }
///
/// match start_dialing() {
///     Ok(_) => println!("Dialing started"),
///     Err(DialerError::ResourceUnavailable(msg)) => println!("Try later: {}", msg),
///     Err(e) => println!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum DialerError {
    /// Database operation errors
    ///
    /// Includes connection failures, SQL errors, transaction problems,
    /// and data consistency issues with the SQLite store.
    ///
    /// # Examples
    /// - Connection timeout
    /// - Migration failure on startup
    /// - Constraint violations
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration validation errors
    ///
    /// Problems with the dialer's own settings, including invalid values
    /// and missing required fields detected by [`crate::config::DialerConfig::validate`].
    ///
    /// # Examples
    /// - Zero-length dispatch interval
    /// - Empty trunk prefix
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Switch config artifact generation errors
    ///
    /// Raised when a campaign is missing data the generators cannot work
    /// without. Generation is all-or-nothing: when this error is returned
    /// no partial artifact is produced.
    ///
    /// # Examples
    /// - Campaign with an empty id
    #[error("Config artifact error: {0}")]
    Artifact(String),

    /// Rejected campaign lifecycle transition
    ///
    /// The campaign state machine refused an action for the campaign's
    /// current state. Carries both sides so callers can report exactly
    /// what was attempted.
    ///
    /// # Examples
    /// - Pausing a campaign that never started
    /// - Resuming a stopped campaign
    #[error("Invalid campaign transition: cannot {action} while {from}")]
    InvalidTransition {
        /// State the campaign was in when the action arrived
        from: CampaignStatus,
        /// The action that was rejected
        action: CampaignAction,
    },

    /// Resource unavailable errors
    ///
    /// A shared resource is temporarily exhausted. These are expected
    /// conditions under load, not faults; callers should back off and retry.
    ///
    /// # Examples
    /// - Concurrent campaign limit reached
    /// - Connection pool exhausted
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Retry budget exhausted for a call attempt
    ///
    /// Returned by the retry policy when an attempt has already consumed
    /// every allowed try. The scheduler reacts by marking the attempt
    /// permanently failed; this error never propagates to API callers.
    #[error("Retry budget exhausted for attempt {attempt_id} after {attempts} tries")]
    RetryExhausted {
        /// Attempt that ran out of tries
        attempt_id: String,
        /// Number of tries consumed
        attempts: u32,
    },

    /// Switch dispatch faults
    ///
    /// The switch driver rejected or failed an originate or config-apply
    /// request. The scheduler treats an originate fault like a failed call
    /// so the affected attempt re-enters the retry path.
    #[error("Dispatch fault: {0}")]
    DispatchFault(String),

    /// Resource not found errors
    ///
    /// Requested campaigns, ports, or providers could not be located.
    ///
    /// # Examples
    /// - Campaign id not found
    /// - Provider deleted while campaign referenced it
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal system errors
    ///
    /// Unexpected internal errors that indicate bugs or corrupted state.
    /// These should be logged and investigated.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for DialerError {
    fn from(err: anyhow::Error) -> Self {
        // Map anyhow errors to Internal by default, as they are usually
        // unexpected errors from lower-level components.
        Self::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for DialerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl DialerError {
    /// Create a new Database error with the provided message
    ///
    /// # Examples
    ///
    /// ```
    /// use outdial_dialer_engine::DialerError;
    ///
    /// let error = DialerError::database("Connection to dialer.db failed");
    /// println!("{}", error);  // Prints: Database error: Connection to dialer.db failed
    /// ```
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    /// Create a new Configuration error with the provided message
    ///
    /// # Examples
    ///
    /// ```
    /// use outdial_dialer_engine::DialerError;
    ///
    /// let error = DialerError::configuration("dispatch_interval cannot be zero");
    /// println!("{}", error);
    /// ```
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new Artifact error with the provided message
    ///
    /// # Examples
    ///
    /// ```
    /// use outdial_dialer_engine::DialerError;
    ///
    /// let error = DialerError::artifact("Campaign id is empty");
    /// println!("{}", error);
    /// ```
    pub fn artifact<S: Into<String>>(msg: S) -> Self {
        Self::Artifact(msg.into())
    }

    /// Create a new ResourceUnavailable error with the provided message
    ///
    /// # Examples
    ///
    /// ```
    /// use outdial_dialer_engine::DialerError;
    ///
    /// let error = DialerError::resource_unavailable("All 8 gateway ports busy");
    /// println!("{}", error);
    /// ```
    pub fn resource_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ResourceUnavailable(msg.into())
    }

    /// Create a new DispatchFault error with the provided message
    ///
    /// # Examples
    ///
    /// ```
    /// use outdial_dialer_engine::DialerError;
    ///
    /// let error = DialerError::dispatch_fault("Switch refused originate on port 3");
    /// println!("{}", error);
    /// ```
    pub fn dispatch_fault<S: Into<String>>(msg: S) -> Self {
        Self::DispatchFault(msg.into())
    }

    /// Create a new NotFound error with the provided message
    ///
    /// # Examples
    ///
    /// ```
    /// use outdial_dialer_engine::DialerError;
    ///
    /// let error = DialerError::not_found("Campaign 'camp-123' not found");
    /// println!("{}", error);
    /// ```
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Internal error with the provided message
    ///
    /// # Examples
    ///
    /// ```
    /// use outdial_dialer_engine::DialerError;
    ///
    /// let error = DialerError::internal("Unexpected state in outcome worker");
    /// println!("{}", error);
    /// ```
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type for dialer operations
///
/// This is a type alias for `std::result::Result<T, DialerError>` that simplifies
/// error handling throughout the dialer codebase.
///
/// # Examples
///
/// ```
/// use outdial_dialer_engine::{Result, DialerError};
///
/// fn lookup_campaign(id: &str) -> Result<String> {
///     if id.is_empty() {
///         return Err(DialerError::not_found("Campaign id cannot be empty"));
///     }
///     Ok(format!("campaign-{}", id))
/// }
///
/// match lookup_campaign("") {
///     Ok(name) => println!("Found: {}", name),
///     Err(e) => eprintln!("Lookup failed: {}", e),
/// }
/// ```
pub type Result<T> = std::result::Result<T, DialerError>;
