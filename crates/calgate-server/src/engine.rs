use std::sync::Arc;

use calgate_contracts::NotifyDecision;
use calgate_kernel::{find_active_event, notification_message};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::freshness::{ensure_config_fresh, ensure_events_fresh};
use crate::ports::Collaborators;
use crate::registry::ConfigRegistry;
use crate::suppression::SuppressionGuard;

/// Decides whether chat activity in a room should produce a calendar
/// notification.
pub struct DecisionEngine {
    registry: Arc<ConfigRegistry>,
    collab: Collaborators,
    suppression: SuppressionGuard,
}

impl DecisionEngine {
    pub fn new(registry: Arc<ConfigRegistry>, collab: Collaborators) -> Self {
        let suppression = SuppressionGuard::new(collab.kv.clone());
        Self {
            registry,
            collab,
            suppression,
        }
    }

    pub fn suppression(&self) -> &SuppressionGuard {
        &self.suppression
    }

    pub async fn evaluate(
        &self,
        room_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> NotifyDecision {
        if self.suppression.should_suppress(user_id, room_id).await {
            debug!(room_id, user_id, "notification suppressed");
            return NotifyDecision::Suppressed;
        }

        let room = self.registry.get_or_create(room_id).await;
        if let Err(err) = ensure_config_fresh(&room, self.collab.prefs.as_ref(), now).await {
            warn!(room_id, error = %err, "room config unavailable");
            return NotifyDecision::ConfigUnavailable {
                reason: err.to_string(),
            };
        }

        let events = match ensure_events_fresh(&room, self.collab.calendar.as_ref(), now).await {
            Ok(events) => events,
            Err(err) => {
                warn!(room_id, error = %err, "calendar events unavailable");
                return NotifyDecision::EventsUnavailable {
                    reason: err.to_string(),
                };
            }
        };

        let Some(event) = find_active_event(&events, now) else {
            return NotifyDecision::NoActiveEvent;
        };
        if !room.autoreply().await {
            debug!(room_id, event = %event.name, "active event but autoreply is off");
            return NotifyDecision::ActiveButAutoreplyDisabled;
        }

        // Another evaluation may have notified while this one was refreshing.
        let _guard = room.notify_guard().await;
        if self.suppression.should_suppress(user_id, room_id).await {
            debug!(room_id, user_id, "notified concurrently, suppressing");
            return NotifyDecision::Suppressed;
        }
        let message = notification_message(event);
        self.suppression.record_notified(user_id, room_id, now).await;
        info!(room_id, user_id, event = %event.name, "calendar notification");
        NotifyDecision::Notify { message }
    }
}
