//! # Campaign Types and Lifecycle Rules
//!
//! Campaign definitions, the lifecycle state machine, and the snapshot
//! structure published to monitoring subscribers.
//!
//! The state machine itself is pure and synchronous; persistence and the
//! queued-attempt guard around starting live in the orchestrator.

mod state;
mod types;

pub use types::{Campaign, CampaignAction, CampaignSnapshot, CampaignStatus, NewCampaign};
