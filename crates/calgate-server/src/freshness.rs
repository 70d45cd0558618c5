use std::sync::Arc;

use calgate_contracts::Event;
use calgate_kernel::{age_minutes, is_stale, CONFIG_MAX_AGE, EVENTS_MAX_AGE};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::RoomError;
use crate::ports::{CalendarSource, PrefStore};
use crate::room::RoomConfig;

/// Reloads the room's config first if it is older than [`CONFIG_MAX_AGE`].
pub async fn ensure_config_fresh(
    room: &RoomConfig,
    prefs: &dyn PrefStore,
    now: DateTime<Utc>,
) -> Result<(), RoomError> {
    let fetched_at = room.config_fetched_at().await;
    if !is_stale(fetched_at, now, CONFIG_MAX_AGE) {
        return Ok(());
    }
    debug!(
        room_id = room.room_id(),
        age_minutes = ?age_minutes(fetched_at, now),
        "config cache stale, reloading"
    );
    room.reload_config(prefs, now).await
}

/// Returns the cached events, refetching them first if they are older than
/// [`EVENTS_MAX_AGE`]. A failed refetch is returned as an error even when an
/// older list is still cached.
pub async fn ensure_events_fresh(
    room: &RoomConfig,
    calendar: &dyn CalendarSource,
    now: DateTime<Utc>,
) -> Result<Arc<Vec<Event>>, RoomError> {
    let fetched_at = room.events_fetched_at().await;
    if is_stale(fetched_at, now, EVENTS_MAX_AGE) {
        info!(
            room_id = room.room_id(),
            age_minutes = ?age_minutes(fetched_at, now),
            "calendar cache stale, fetching synchronously"
        );
        room.refresh_events(calendar, now).await?;
    }
    Ok(room.events().await)
}
