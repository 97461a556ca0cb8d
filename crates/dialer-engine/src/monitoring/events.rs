//! # Dialer Event System
//!
//! Real-time notifications for campaign activity. Events are broadcast to
//! all subscribers and kept in a bounded in-memory history for inspection.
//!
//! Publishing is fire-and-forget: a slow or absent subscriber never blocks
//! an outcome worker, it just misses events once its buffer laps.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::campaign::{CampaignSnapshot, CampaignStatus};

/// Events published by the dialer engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DialerEvent {
    /// A campaign changed lifecycle state
    CampaignStateChanged {
        campaign_id: String,
        from: CampaignStatus,
        to: CampaignStatus,
        at: DateTime<Utc>,
    },

    /// Fresh progress snapshot after an applied outcome
    CampaignProgress(CampaignSnapshot),

    /// A call attempt ran out of retry budget
    AttemptExhausted {
        campaign_id: String,
        attempt_id: String,
        tries: u32,
        at: DateTime<Utc>,
    },

    /// A gateway port was flagged faulty and pulled from the pool
    PortFlagged {
        port_id: String,
        reason: String,
        at: DateTime<Utc>,
    },
}

/// Broadcast hub for dialer events
///
/// Cheap to clone; all clones feed the same subscribers.
///
/// # Examples
///
/// ```rust
/// use outdial_dialer_engine::monitoring::{DialerEvent, DialerEventHub};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hub = DialerEventHub::new(256);
/// let mut rx = hub.subscribe();
///
/// tokio::spawn(async move {
///     while let Ok(event) = rx.recv().await {
///         if let DialerEvent::CampaignProgress(snapshot) = event {
///             println!("📊 {} at {}%", snapshot.campaign_id, snapshot.progress_percent);
///         }
///     }
/// });
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DialerEventHub {
    broadcaster: broadcast::Sender<DialerEvent>,
    /// Ring of recent events for on-demand inspection
    history: Arc<RwLock<Vec<DialerEvent>>>,
    max_history: usize,
}

impl DialerEventHub {
    /// Create a hub whose broadcast channel buffers `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (broadcaster, _) = broadcast::channel(capacity.max(1));
        Self {
            broadcaster,
            history: Arc::new(RwLock::new(Vec::new())),
            max_history: 1000,
        }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<DialerEvent> {
        self.broadcaster.subscribe()
    }

    /// Publish an event to every subscriber
    ///
    /// Never blocks and never fails: with no subscribers the event only
    /// lands in history.
    pub fn publish(&self, event: DialerEvent) {
        {
            let mut history = self.history.write();
            history.push(event.clone());
            if history.len() > self.max_history {
                history.remove(0);
            }
        }

        // An Err here just means nobody is listening right now.
        let _ = self.broadcaster.send(event);
    }

    /// Most recent events, oldest first
    pub fn recent(&self, limit: usize) -> Vec<DialerEvent> {
        let history = self.history.read();
        let skip = history.len().saturating_sub(limit);
        history[skip..].to_vec()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.receiver_count()
    }
}

impl DialerEventHub {
    /// Convenience publisher for state transitions
    pub fn campaign_state_changed(
        &self,
        campaign_id: &str,
        from: CampaignStatus,
        to: CampaignStatus,
    ) {
        debug!("📡 Campaign {} moved {} -> {}", campaign_id, from, to);
        self.publish(DialerEvent::CampaignStateChanged {
            campaign_id: campaign_id.to_string(),
            from,
            to,
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let hub = DialerEventHub::new(8);
        let mut rx = hub.subscribe();

        hub.campaign_state_changed("camp-1", CampaignStatus::Created, CampaignStatus::Running);

        match rx.recv().await.unwrap() {
            DialerEvent::CampaignStateChanged { campaign_id, from, to, .. } => {
                assert_eq!(campaign_id, "camp-1");
                assert_eq!(from, CampaignStatus::Created);
                assert_eq!(to, CampaignStatus::Running);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let hub = DialerEventHub::new(8);
        hub.publish(DialerEvent::PortFlagged {
            port_id: "gw1-port-1".to_string(),
            reason: "registration lost".to_string(),
            at: Utc::now(),
        });
        assert_eq!(hub.recent(10).len(), 1);
    }

    #[test]
    fn history_is_bounded_and_ordered() {
        let hub = DialerEventHub::new(8);
        for i in 0..5 {
            hub.publish(DialerEvent::PortFlagged {
                port_id: format!("gw1-port-{}", i),
                reason: "test".to_string(),
                at: Utc::now(),
            });
        }
        let recent = hub.recent(2);
        assert_eq!(recent.len(), 2);
        match &recent[1] {
            DialerEvent::PortFlagged { port_id, .. } => assert_eq!(port_id, "gw1-port-4"),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
