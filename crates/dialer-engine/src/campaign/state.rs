//! Campaign lifecycle state machine
//!
//! The transition table is small and deliberately strict: anything not
//! listed is rejected with the state and action that were attempted, so
//! callers can report exactly what went wrong.

use crate::error::{DialerError, Result};

use super::types::{CampaignAction, CampaignStatus};

impl CampaignStatus {
    /// Apply a lifecycle action, returning the next state
    ///
    /// | From    | Action        | To        |
    /// |---------|---------------|-----------|
    /// | created | start         | running   |
    /// | paused  | start, resume | running   |
    /// | running | pause         | paused    |
    /// | running | stop          | stopped   |
    /// | paused  | stop          | stopped   |
    /// | running | complete      | completed |
    ///
    /// Terminal states (stopped, completed) accept nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use outdial_dialer_engine::campaign::{CampaignAction, CampaignStatus};
    /// use outdial_dialer_engine::DialerError;
    ///
    /// let running = CampaignStatus::Created.apply(CampaignAction::Start).unwrap();
    /// assert_eq!(running, CampaignStatus::Running);
    ///
    /// match CampaignStatus::Stopped.apply(CampaignAction::Resume) {
    ///     Err(DialerError::InvalidTransition { from, action }) => {
    ///         assert_eq!(from, CampaignStatus::Stopped);
    ///         assert_eq!(action, CampaignAction::Resume);
    ///     }
    ///     other => panic!("expected rejection, got {:?}", other),
    /// }
    /// ```
    pub fn apply(self, action: CampaignAction) -> Result<CampaignStatus> {
        use CampaignAction::*;
        use CampaignStatus::*;

        let next = match (self, action) {
            (Created, Start) => Running,
            (Paused, Start) | (Paused, Resume) => Running,
            (Running, Pause) => Paused,
            (Running, Stop) | (Paused, Stop) => Stopped,
            (Running, Complete) => Completed,
            (from, action) => return Err(DialerError::InvalidTransition { from, action }),
        };
        Ok(next)
    }
}
