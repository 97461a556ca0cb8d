use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Campaign lifecycle states
///
/// A campaign moves through these states under operator actions and one
/// automatic transition: the engine completes a running campaign once every
/// call attempt has reached a terminal status.
///
/// # Examples
///
/// ```
/// use outdial_dialer_engine::campaign::{CampaignAction, CampaignStatus};
///
/// let status = CampaignStatus::Created;
/// let status = status.apply(CampaignAction::Start).unwrap();
/// assert_eq!(status, CampaignStatus::Running);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatus {
    /// Defined but never started; attempts are seeded and waiting
    Created,
    /// Actively dispatching due attempts
    Running,
    /// Dispatching suspended; queued attempts and counters are retained
    Paused,
    /// Halted by an operator; terminal
    Stopped,
    /// Every attempt reached a terminal status; terminal
    Completed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Created => "CREATED",
            CampaignStatus::Running => "RUNNING",
            CampaignStatus::Paused => "PAUSED",
            CampaignStatus::Stopped => "STOPPED",
            CampaignStatus::Completed => "COMPLETED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(CampaignStatus::Created),
            "RUNNING" => Some(CampaignStatus::Running),
            "PAUSED" => Some(CampaignStatus::Paused),
            "STOPPED" => Some(CampaignStatus::Stopped),
            "COMPLETED" => Some(CampaignStatus::Completed),
            _ => None,
        }
    }

    /// Terminal states accept no further actions
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Stopped | CampaignStatus::Completed)
    }

    /// Only running campaigns are scanned for due attempts
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, CampaignStatus::Running)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CampaignStatus::Created => "created",
            CampaignStatus::Running => "running",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Stopped => "stopped",
            CampaignStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Actions that drive campaign lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignAction {
    Start,
    Pause,
    Resume,
    Stop,
    /// Internal action applied by the engine when all attempts are terminal
    Complete,
}

impl CampaignAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignAction::Start => "start",
            CampaignAction::Pause => "pause",
            CampaignAction::Resume => "resume",
            CampaignAction::Stop => "stop",
            CampaignAction::Complete => "complete",
        }
    }
}

impl std::fmt::Display for CampaignAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dialing campaign
///
/// Couples a contact list with a greeting, an optional transfer destination,
/// an optional SIP provider for the transfer leg, and an optional preference
/// list of gateway ports to dial from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub status: CampaignStatus,
    /// Contact list this campaign's attempts were seeded from
    pub contact_list_id: String,
    /// Prompt played to an answered callee, e.g. `custom/welcome`
    pub greeting_reference: String,
    /// Destination dialed when the callee presses 1; may be empty
    pub transfer_number: Option<String>,
    /// SIP provider carrying the transfer leg, when configured
    pub provider_id: Option<String>,
    /// Preferred gateway ports, tried in order before the general pool
    pub port_selection: Vec<String>,
    /// Number of call attempts seeded at creation
    pub total_attempts: u32,
    /// Attempts that ended answered (including transferred ones)
    pub answered: u32,
    /// Attempts where the callee was bridged onward
    pub transferred: u32,
    /// Attempts that exhausted their retry budget
    pub failed: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Build a persistable campaign from creation parameters
    pub fn from_new(id: impl Into<String>, new: &NewCampaign) -> Self {
        let now = Utc::now();
        Campaign {
            id: id.into(),
            owner_id: new.owner_id.clone(),
            name: new.name.clone(),
            status: CampaignStatus::Created,
            contact_list_id: new.contact_list_id.clone(),
            greeting_reference: new.greeting_reference.clone(),
            transfer_number: new.transfer_number.clone(),
            provider_id: new.provider_id.clone(),
            port_selection: new.port_selection.clone(),
            total_attempts: 0,
            answered: 0,
            transferred: 0,
            failed: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// First entry of the port preference list, if any
    pub fn preferred_port(&self) -> Option<&str> {
        self.port_selection.first().map(String::as_str)
    }
}

/// Parameters for creating a campaign
///
/// The engine assigns the id, seeds one call attempt per contact, and
/// persists the campaign in [`CampaignStatus::Created`].
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub owner_id: String,
    pub name: String,
    pub contact_list_id: String,
    pub greeting_reference: String,
    pub transfer_number: Option<String>,
    pub provider_id: Option<String>,
    pub port_selection: Vec<String>,
    /// Phone numbers to dial, one call attempt each
    pub contacts: Vec<String>,
}

/// Point-in-time view of a campaign's progress
///
/// Published on the event bus after every applied outcome and available on
/// demand from the engine. Counters are monotonically non-decreasing for
/// the life of a campaign run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSnapshot {
    pub campaign_id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub total_attempts: u32,
    pub answered: u32,
    pub transferred: u32,
    pub failed: u32,
    /// Attempts that reached a terminal status (succeeded or permanently failed)
    pub completed_attempts: u32,
    /// Whole-number completion percentage, clamped to 0..=100
    pub progress_percent: u8,
    pub updated_at: DateTime<Utc>,
}
