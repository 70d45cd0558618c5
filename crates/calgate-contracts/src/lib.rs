use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single calendar entry as produced by the calendar source.
///
/// Events are never mutated after they are fetched; a refresh replaces the
/// whole cached list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Event {
    /// True when `now` lies strictly between start and end.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start < now && now < self.end
    }

    pub fn is_well_formed(&self) -> bool {
        self.start < self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum NotifyDecision {
    Suppressed,
    ConfigUnavailable { reason: String },
    EventsUnavailable { reason: String },
    NoActiveEvent,
    ActiveButAutoreplyDisabled,
    Notify { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatEvent {
    pub room_id: String,
    pub user_id: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatEventResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<NotifyDecision>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomRegistration {
    pub room_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrefValue {
    pub value: String,
}

/// Snapshot of one room's cached state, as reported by `status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheStatus {
    pub room_id: String,
    pub calendar_id: String,
    pub timezone: String,
    pub autoreply: bool,
    pub announce_start: bool,
    pub announce_end: bool,
    pub event_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_age_minutes: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_age_minutes: Option<f64>,
}
