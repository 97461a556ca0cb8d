//! # Call Queue and Retry Policy
//!
//! Types for the per-campaign attempt queue: attempt lifecycle states, the
//! call outcome events fed back from the switch, and the fixed retry
//! pacing applied to failed calls.
//!
//! The queue itself is persistent; see the attempt operations on
//! [`crate::database::DatabaseManager`]. Dispatching is driven from
//! [`crate::DialerEngine`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DialerError, Result};

pub use crate::database::CallAttempt;

/// Maximum number of tries a call attempt may consume
///
/// Once a try fails with no retry budget left the attempt is marked
/// permanently failed. This is fixed policy, not configuration.
pub const MAX_CALL_RETRIES: u32 = 3;

/// Upper bound on retry backoff, in minutes
pub const BACKOFF_CAP_MINUTES: i64 = 60;

/// Call attempt lifecycle states as stored in the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptStatus {
    /// Waiting for its first dispatch
    Queued,
    /// Handed to the switch; a terminal outcome is expected
    Dispatched,
    /// Call reached the callee; terminal
    Succeeded,
    /// Last try failed; waiting out its backoff before the next one
    Failed,
    /// Retry budget exhausted; terminal
    PermanentlyFailed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Queued => "QUEUED",
            AttemptStatus::Dispatched => "DISPATCHED",
            AttemptStatus::Succeeded => "SUCCEEDED",
            AttemptStatus::Failed => "FAILED",
            AttemptStatus::PermanentlyFailed => "PERMANENTLY_FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(AttemptStatus::Queued),
            "DISPATCHED" => Some(AttemptStatus::Dispatched),
            "SUCCEEDED" => Some(AttemptStatus::Succeeded),
            "FAILED" => Some(AttemptStatus::Failed),
            "PERMANENTLY_FAILED" => Some(AttemptStatus::PermanentlyFailed),
            _ => None,
        }
    }

    /// Terminal attempts count toward campaign completion
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptStatus::Succeeded | AttemptStatus::PermanentlyFailed
        )
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one dialed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    /// Callee answered and heard the greeting
    Answered,
    /// Callee answered and was bridged to the transfer destination
    Transferred,
    /// Line busy
    Busy,
    /// Rang out without an answer
    NoAnswer,
    /// Switch-level failure (congestion, channel fault, rejected originate)
    Failed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Answered => "ANSWERED",
            OutcomeStatus::Transferred => "TRANSFERRED",
            OutcomeStatus::Busy => "BUSY",
            OutcomeStatus::NoAnswer => "NO_ANSWER",
            OutcomeStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ANSWERED" => Some(OutcomeStatus::Answered),
            "TRANSFERRED" => Some(OutcomeStatus::Transferred),
            "BUSY" => Some(OutcomeStatus::Busy),
            "NO_ANSWER" => Some(OutcomeStatus::NoAnswer),
            "FAILED" => Some(OutcomeStatus::Failed),
            _ => None,
        }
    }

    /// Answered and transferred calls close their attempt successfully
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeStatus::Answered | OutcomeStatus::Transferred)
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call outcome event from the switch
///
/// The outcome feed is at-least-once: the same event may be delivered more
/// than once and events may arrive late. Application is idempotent, so
/// feeding a duplicate changes nothing. The try number pins the event to
/// the dispatch that placed the call; an event for a try that is no longer
/// in flight is dropped.
///
/// # Examples
///
/// ```
/// use outdial_dialer_engine::queue::{CallOutcome, OutcomeStatus};
///
/// let outcome = CallOutcome::new("attempt-1", "camp-1", 1, OutcomeStatus::Answered)
///     .with_port("gw1-port-3")
///     .with_duration(42);
/// assert!(outcome.status.is_success());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallOutcome {
    /// Call attempt this outcome belongs to
    pub attempt_id: String,
    pub campaign_id: String,
    /// 1-based try this outcome reports, echoed from the dispatch
    /// instruction
    pub try_number: u32,
    /// Port the call went out on, when the switch reports it
    pub port_id: Option<String>,
    pub status: OutcomeStatus,
    /// Talk time in seconds for answered calls
    pub duration_secs: Option<u64>,
    /// Callee pressed the transfer digit during the call
    pub transfer_requested: bool,
    /// The transfer bridge connected
    pub transfer_successful: bool,
    pub occurred_at: DateTime<Utc>,
}

impl CallOutcome {
    pub fn new<S1, S2>(
        attempt_id: S1,
        campaign_id: S2,
        try_number: u32,
        status: OutcomeStatus,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        let transferred = status == OutcomeStatus::Transferred;
        Self {
            attempt_id: attempt_id.into(),
            campaign_id: campaign_id.into(),
            try_number,
            port_id: None,
            status,
            duration_secs: None,
            transfer_requested: transferred,
            transfer_successful: transferred,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_port<S: Into<String>>(mut self, port_id: S) -> Self {
        self.port_id = Some(port_id.into());
        self
    }

    pub fn with_duration(mut self, duration_secs: u64) -> Self {
        self.duration_secs = Some(duration_secs);
        self
    }

    /// Record a transfer that was asked for but did not complete
    ///
    /// A [`OutcomeStatus::Transferred`] outcome already implies both flags.
    pub fn with_transfer(mut self, requested: bool, successful: bool) -> Self {
        self.transfer_requested = requested;
        self.transfer_successful = successful;
        self
    }
}

/// Fixed retry pacing for failed call attempts
///
/// Failed tries are re-queued with an exponential backoff of
/// `min(2^tries, 60)` minutes. After [`MAX_CALL_RETRIES`] tries the
/// attempt is out of budget and is marked permanently failed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy;

impl RetryPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Backoff applied after the given number of consumed tries
    ///
    /// # Examples
    ///
    /// ```
    /// use outdial_dialer_engine::queue::RetryPolicy;
    ///
    /// let policy = RetryPolicy::new();
    /// assert_eq!(policy.backoff_delay(1).num_minutes(), 2);
    /// assert_eq!(policy.backoff_delay(5).num_minutes(), 32);
    /// assert_eq!(policy.backoff_delay(6).num_minutes(), 60);
    /// assert_eq!(policy.backoff_delay(40).num_minutes(), 60);
    /// ```
    pub fn backoff_delay(&self, tries: u32) -> Duration {
        // 2^tries minutes, saturating well past the cap to avoid overflow.
        let exp = 1i64 << tries.min(7);
        Duration::minutes(exp.min(BACKOFF_CAP_MINUTES))
    }

    /// Decide the next step for an attempt whose latest try failed
    ///
    /// Returns when the attempt may be dispatched again, or
    /// [`DialerError::RetryExhausted`] when its budget is spent.
    pub fn next_attempt_at(&self, attempt_id: &str, tries: u32) -> Result<DateTime<Utc>> {
        if tries >= MAX_CALL_RETRIES {
            return Err(DialerError::RetryExhausted {
                attempt_id: attempt_id.to_string(),
                attempts: tries,
            });
        }
        Ok(Utc::now() + self.backoff_delay(tries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_series_doubles_to_the_cap() {
        let policy = RetryPolicy::new();
        let minutes: Vec<i64> = (1..=7)
            .map(|tries| policy.backoff_delay(tries).num_minutes())
            .collect();
        assert_eq!(minutes, vec![2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn backoff_never_exceeds_cap_for_large_counts() {
        let policy = RetryPolicy::new();
        for tries in [8, 16, 31, 32, 64, u32::MAX] {
            assert_eq!(policy.backoff_delay(tries).num_minutes(), BACKOFF_CAP_MINUTES);
        }
    }

    #[test]
    fn budget_exhausts_after_max_tries() {
        let policy = RetryPolicy::new();

        let first = policy.next_attempt_at("attempt-1", 1).unwrap();
        assert!(first > Utc::now());

        assert!(policy.next_attempt_at("attempt-1", 2).is_ok());

        match policy.next_attempt_at("attempt-1", MAX_CALL_RETRIES) {
            Err(DialerError::RetryExhausted { attempt_id, attempts }) => {
                assert_eq!(attempt_id, "attempt-1");
                assert_eq!(attempts, MAX_CALL_RETRIES);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[test]
    fn outcome_status_success_split() {
        assert!(OutcomeStatus::Answered.is_success());
        assert!(OutcomeStatus::Transferred.is_success());
        assert!(!OutcomeStatus::Busy.is_success());
        assert!(!OutcomeStatus::NoAnswer.is_success());
        assert!(!OutcomeStatus::Failed.is_success());
    }

    #[test]
    fn transferred_outcome_implies_transfer_flags() {
        let outcome = CallOutcome::new("a-1", "c-1", 1, OutcomeStatus::Transferred);
        assert!(outcome.transfer_requested);
        assert!(outcome.transfer_successful);

        let answered = CallOutcome::new("a-1", "c-1", 1, OutcomeStatus::Answered);
        assert!(!answered.transfer_requested);

        // A failed bridge leaves the call answered but flags the request
        let dropped = CallOutcome::new("a-1", "c-1", 1, OutcomeStatus::Answered)
            .with_transfer(true, false);
        assert!(dropped.transfer_requested);
        assert!(!dropped.transfer_successful);
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            AttemptStatus::Queued,
            AttemptStatus::Dispatched,
            AttemptStatus::Succeeded,
            AttemptStatus::Failed,
            AttemptStatus::PermanentlyFailed,
        ] {
            assert_eq!(AttemptStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(AttemptStatus::from_str("bogus"), None);
    }
}
