use std::sync::Arc;
use std::time::Duration;

use calgate_kernel::{
    room_suppression_key, user_suppression_key, ROOM_SUPPRESSION_TTL, SILENCE_MARKER,
    USER_SUPPRESSION_TTL,
};
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::StoreError;
use crate::ports::KvStore;

/// Time-boxed notification suppression per (user, room) and per room.
///
/// Store failures on the read side count as "not suppressed": a duplicate
/// notification is preferred over a room that never hears from us again.
#[derive(Clone)]
pub struct SuppressionGuard {
    kv: Arc<dyn KvStore>,
}

impl SuppressionGuard {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn should_suppress(&self, user_id: &str, room_id: &str) -> bool {
        for key in [
            user_suppression_key(user_id, room_id),
            room_suppression_key(room_id),
        ] {
            match self.kv.get(&key).await {
                Ok(Some(value)) if !value.is_empty() => return true,
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        key = %key,
                        error = %err,
                        "suppression lookup failed, treating as not suppressed"
                    );
                }
            }
        }
        false
    }

    /// Opens the user window (2h) and the room window (10m).
    pub async fn record_notified(&self, user_id: &str, room_id: &str, now: DateTime<Utc>) {
        let marker = now.to_rfc3339();
        let writes = [
            (user_suppression_key(user_id, room_id), USER_SUPPRESSION_TTL),
            (room_suppression_key(room_id), ROOM_SUPPRESSION_TTL),
        ];
        for (key, ttl) in writes {
            if let Err(err) = self.kv.set(&key, &marker, ttl).await {
                warn!(key = %key, error = %err, "failed to record suppression window");
            }
        }
    }

    /// Silences the whole room for `duration`. Replaces any automatic room
    /// window, whichever expires first.
    pub async fn silence(&self, room_id: &str, duration: Duration) -> Result<(), StoreError> {
        self.kv
            .set(&room_suppression_key(room_id), SILENCE_MARKER, duration)
            .await
    }
}
