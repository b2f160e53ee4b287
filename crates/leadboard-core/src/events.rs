//! Typed in-process event bus for cross-view notifications.
//!
//! Views that change a lead somewhere publish a `DashboardEvent`; views that
//! show derived data (the activity feed, the call queue) subscribe to it.
//! The bus is built by the host and handed to the views that need it.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::utils::{format_duration_ms, preview};

/// Buffer size for the event channel.
/// Slow subscribers that fall further behind skip the oldest events.
const EVENT_BUS_CAPACITY: usize = 64;

/// Number of entries kept in the recent activity feed
pub const MAX_RECENT_ACTIVITY: usize = 10;

/// Characters of a note shown in its activity entry
const NOTES_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DashboardEvent {
    LeadsImported,
    #[serde(rename_all = "camelCase")]
    LeadDeleted { lead_id: String },
    #[serde(rename_all = "camelCase")]
    LeadStatusUpdated { lead_id: String, status: String },
    #[serde(rename_all = "camelCase")]
    CallCompleted {
        lead_id: String,
        lead_name: String,
        duration_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    FollowUpScheduled {
        lead_id: String,
        lead_name: String,
        follow_up_date: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    NotesAdded {
        lead_id: String,
        lead_name: String,
        notes: String,
    },
    #[serde(rename_all = "camelCase")]
    LeadAssigned {
        lead_id: String,
        lead_name: String,
        assigned_to: String,
    },
}

impl DashboardEvent {
    pub fn lead_id(&self) -> Option<&str> {
        match self {
            DashboardEvent::LeadsImported => None,
            DashboardEvent::LeadDeleted { lead_id }
            | DashboardEvent::LeadStatusUpdated { lead_id, .. }
            | DashboardEvent::CallCompleted { lead_id, .. }
            | DashboardEvent::FollowUpScheduled { lead_id, .. }
            | DashboardEvent::NotesAdded { lead_id, .. }
            | DashboardEvent::LeadAssigned { lead_id, .. } => Some(lead_id),
        }
    }

    /// Events after which the lead list itself is out of date.
    pub fn changes_lead_list(&self) -> bool {
        matches!(
            self,
            DashboardEvent::LeadsImported | DashboardEvent::LeadDeleted { .. }
        )
    }
}

/// Publish/subscribe channel for `DashboardEvent`s.
/// Clone is cheap; all clones publish to the same subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DashboardEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Returns how many subscribers will see it; having
    /// none is fine.
    pub fn publish(&self, event: DashboardEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                debug!(event = ?event, "No subscribers for event");
                0
            }
        }
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }
}

pub struct EventSubscription {
    rx: broadcast::Receiver<DashboardEvent>,
}

impl EventSubscription {
    /// Next event, or `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<DashboardEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Event subscriber lagged, skipping events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    CallCompleted,
    FollowUpScheduled,
    NotesAdded,
    LeadAssigned,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub kind: ActivityKind,
    pub message: String,
    pub details: String,
    pub lead_id: Option<String>,
    pub time: DateTime<Utc>,
}

/// Most recent activities derived from dashboard events, newest first.
#[derive(Debug, Default)]
pub struct ActivityFeed {
    items: VecDeque<Activity>,
}

impl ActivityFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &DashboardEvent) {
        self.apply_at(event, Utc::now());
    }

    fn apply_at(&mut self, event: &DashboardEvent, now: DateTime<Utc>) {
        let (kind, message, details) = match event {
            DashboardEvent::LeadDeleted { lead_id } => {
                self.items
                    .retain(|a| a.lead_id.as_deref() != Some(lead_id.as_str()));
                return;
            }
            DashboardEvent::LeadsImported | DashboardEvent::LeadStatusUpdated { .. } => return,
            DashboardEvent::CallCompleted {
                lead_name,
                duration_ms,
                ..
            } => (
                ActivityKind::CallCompleted,
                format!("Call completed with \"{}\"", lead_name),
                format!("Call duration: {}", format_duration_ms(*duration_ms)),
            ),
            DashboardEvent::FollowUpScheduled {
                lead_name,
                follow_up_date,
                ..
            } => (
                ActivityKind::FollowUpScheduled,
                format!("Follow-up scheduled for \"{}\"", lead_name),
                format!("Follow-up date: {}", follow_up_date.format("%Y-%m-%d")),
            ),
            DashboardEvent::NotesAdded {
                lead_name, notes, ..
            } => (
                ActivityKind::NotesAdded,
                format!("Notes added to \"{}\"", lead_name),
                format!("Notes: {}", preview(notes, NOTES_PREVIEW_CHARS)),
            ),
            DashboardEvent::LeadAssigned {
                lead_name,
                assigned_to,
                ..
            } => (
                ActivityKind::LeadAssigned,
                format!("Lead \"{}\" assigned", lead_name),
                format!("Assigned to: {}", assigned_to),
            ),
        };

        self.items.push_front(Activity {
            kind,
            message,
            details,
            lead_id: event.lead_id().map(str::to_owned),
            time: now,
        });
        self.items.truncate(MAX_RECENT_ACTIVITY);
    }

    pub fn items(&self) -> impl Iterator<Item = &Activity> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn notes(lead_id: &str, text: &str) -> DashboardEvent {
        DashboardEvent::NotesAdded {
            lead_id: lead_id.to_string(),
            lead_name: format!("Lead {}", lead_id),
            notes: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        assert_eq!(bus.publish(DashboardEvent::LeadsImported), 2);
        assert_eq!(a.recv().await, Some(DashboardEvent::LeadsImported));
        assert_eq!(b.recv().await, Some(DashboardEvent::LeadsImported));
    }

    #[test]
    fn test_publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(DashboardEvent::LeadsImported), 0);
    }

    #[tokio::test]
    async fn test_subscription_ends_when_bus_dropped() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        drop(bus);
        assert_eq!(sub.recv().await, None);
    }

    #[test]
    fn test_event_wire_format() {
        let event = DashboardEvent::LeadAssigned {
            lead_id: "l1".to_string(),
            lead_name: "Acme".to_string(),
            assigned_to: "Sam".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "leadAssigned");
        assert_eq!(json["leadId"], "l1");
        assert_eq!(json["assignedTo"], "Sam");
        assert!(event.lead_id().is_some());
        assert!(!event.changes_lead_list());
        assert!(DashboardEvent::LeadsImported.changes_lead_list());
    }

    #[test]
    fn test_feed_messages() {
        let mut feed = ActivityFeed::new();
        feed.apply(&DashboardEvent::CallCompleted {
            lead_id: "l1".to_string(),
            lead_name: "Acme".to_string(),
            duration_ms: 65_000,
        });
        feed.apply(&DashboardEvent::FollowUpScheduled {
            lead_id: "l2".to_string(),
            lead_name: "Globex".to_string(),
            follow_up_date: Utc.with_ymd_and_hms(2026, 11, 3, 9, 0, 0).unwrap(),
        });
        feed.apply(&notes("l3", &"x".repeat(60)));

        let items: Vec<&Activity> = feed.items().collect();
        assert_eq!(items[0].kind, ActivityKind::NotesAdded);
        assert_eq!(items[0].details, format!("Notes: {}...", "x".repeat(50)));
        assert_eq!(items[1].message, "Follow-up scheduled for \"Globex\"");
        assert_eq!(items[1].details, "Follow-up date: 2026-11-03");
        assert_eq!(items[2].message, "Call completed with \"Acme\"");
        assert_eq!(items[2].details, "Call duration: 1m 5s");
    }

    #[test]
    fn test_feed_keeps_ten_newest() {
        let mut feed = ActivityFeed::new();
        for i in 0..15 {
            feed.apply(&notes(&i.to_string(), "n"));
        }
        assert_eq!(feed.len(), MAX_RECENT_ACTIVITY);
        assert_eq!(feed.items().next().unwrap().lead_id.as_deref(), Some("14"));
    }

    #[test]
    fn test_lead_deleted_removes_its_activity() {
        let mut feed = ActivityFeed::new();
        feed.apply(&notes("keep", "a"));
        feed.apply(&notes("gone", "b"));
        feed.apply(&notes("gone", "c"));

        feed.apply(&DashboardEvent::LeadDeleted {
            lead_id: "gone".to_string(),
        });
        assert_eq!(feed.len(), 1);
        assert_eq!(feed.items().next().unwrap().lead_id.as_deref(), Some("keep"));
    }

    #[test]
    fn test_status_updates_do_not_add_activity() {
        let mut feed = ActivityFeed::new();
        feed.apply(&DashboardEvent::LeadStatusUpdated {
            lead_id: "l1".to_string(),
            status: "qualified".to_string(),
        });
        assert!(feed.is_empty());
    }
}
