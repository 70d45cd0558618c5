use std::sync::Arc;

use calgate_contracts::{CacheStatus, Event};
use calgate_kernel::{
    age_minutes, parse_bool_pref, DEFAULT_TIMEZONE, PREF_ANNOUNCE_END, PREF_ANNOUNCE_START,
    PREF_AUTOREPLY, PREF_CALENDAR_ID, PREF_TIMEZONE,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::RoomError;
use crate::ports::{CalendarSource, PrefStore};

/// Cached settings and events for one chat room.
///
/// Every field lives behind the room's own lock. The lock is never held
/// across a call into the preference store or the calendar source; results
/// are committed afterwards in a single critical section.
pub struct RoomConfig {
    room_id: String,
    state: Mutex<RoomState>,
    notify: Mutex<()>,
}

#[derive(Debug, Clone)]
struct RoomState {
    calendar_id: String,
    timezone: Tz,
    autoreply: bool,
    announce_start: bool,
    announce_end: bool,
    events: Arc<Vec<Event>>,
    config_fetched_at: Option<DateTime<Utc>>,
    events_fetched_at: Option<DateTime<Utc>>,
}

/// Consistent copy of a room's state taken under its lock.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub calendar_id: String,
    pub timezone: Tz,
    pub autoreply: bool,
    pub announce_start: bool,
    pub announce_end: bool,
    pub events: Arc<Vec<Event>>,
    pub config_fetched_at: Option<DateTime<Utc>>,
    pub events_fetched_at: Option<DateTime<Utc>>,
}

impl RoomSnapshot {
    pub fn status(&self, now: DateTime<Utc>) -> CacheStatus {
        CacheStatus {
            room_id: self.room_id.clone(),
            calendar_id: self.calendar_id.clone(),
            timezone: self.timezone.name().to_string(),
            autoreply: self.autoreply,
            announce_start: self.announce_start,
            announce_end: self.announce_end,
            event_count: self.events.len(),
            config_age_minutes: age_minutes(self.config_fetched_at, now),
            events_age_minutes: age_minutes(self.events_fetched_at, now),
        }
    }
}

impl RoomConfig {
    pub fn new(room_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            state: Mutex::new(RoomState {
                calendar_id: String::new(),
                timezone: Tz::America__Los_Angeles,
                autoreply: false,
                announce_start: false,
                announce_end: false,
                events: Arc::new(Vec::new()),
                config_fetched_at: None,
                events_fetched_at: None,
            }),
            notify: Mutex::new(()),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub async fn snapshot(&self) -> RoomSnapshot {
        let state = self.state.lock().await.clone();
        RoomSnapshot {
            room_id: self.room_id.clone(),
            calendar_id: state.calendar_id,
            timezone: state.timezone,
            autoreply: state.autoreply,
            announce_start: state.announce_start,
            announce_end: state.announce_end,
            events: state.events,
            config_fetched_at: state.config_fetched_at,
            events_fetched_at: state.events_fetched_at,
        }
    }

    pub async fn config_fetched_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.config_fetched_at
    }

    pub async fn events_fetched_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.events_fetched_at
    }

    pub async fn events(&self) -> Arc<Vec<Event>> {
        self.state.lock().await.events.clone()
    }

    pub async fn autoreply(&self) -> bool {
        self.state.lock().await.autoreply
    }

    /// Serializes the final suppression check and the suppression write for
    /// this room. Separate from the state lock, which stays free meanwhile.
    pub async fn notify_guard(&self) -> MutexGuard<'_, ()> {
        self.notify.lock().await
    }

    /// Reloads settings from the preference store.
    ///
    /// Fields are applied as they validate. A failure returns early and
    /// leaves earlier writes in place; the config stamp only moves on full
    /// success.
    pub async fn reload_config(
        &self,
        prefs: &dyn PrefStore,
        now: DateTime<Utc>,
    ) -> Result<(), RoomError> {
        let calendar_id = match prefs.get_pref(&self.room_id, PREF_CALENDAR_ID).await {
            Ok(Some(v)) if !v.trim().is_empty() => v.trim().to_string(),
            Ok(_) => {
                return Err(RoomError::Config {
                    room_id: self.room_id.clone(),
                    reason: "calendar-id is not set".to_string(),
                })
            }
            Err(err) => {
                return Err(RoomError::Config {
                    room_id: self.room_id.clone(),
                    reason: err.to_string(),
                })
            }
        };
        self.state.lock().await.calendar_id = calendar_id;

        let autoreply = self.load_bool_pref(prefs, PREF_AUTOREPLY).await;
        let announce_start = self.load_bool_pref(prefs, PREF_ANNOUNCE_START).await;
        let announce_end = self.load_bool_pref(prefs, PREF_ANNOUNCE_END).await;
        {
            let mut state = self.state.lock().await;
            state.autoreply = autoreply;
            state.announce_start = announce_start;
            state.announce_end = announce_end;
        }

        let tz_name = match prefs.get_pref(&self.room_id, PREF_TIMEZONE).await {
            Ok(Some(v)) if !v.trim().is_empty() => v.trim().to_string(),
            Ok(_) => DEFAULT_TIMEZONE.to_string(),
            Err(err) => {
                warn!(
                    room_id = %self.room_id,
                    error = %err,
                    "timezone pref unreadable, using default"
                );
                DEFAULT_TIMEZONE.to_string()
            }
        };
        let timezone = tz_name.parse::<Tz>().map_err(|e| RoomError::Timezone {
            name: tz_name.clone(),
            reason: e.to_string(),
        })?;

        let mut state = self.state.lock().await;
        state.timezone = timezone;
        state.config_fetched_at = Some(now);
        debug!(room_id = %self.room_id, calendar_id = %state.calendar_id, "room config reloaded");
        Ok(())
    }

    /// Replaces the cached events with a fresh fetch. A failure leaves the
    /// previous list and its stamp untouched.
    pub async fn refresh_events(
        &self,
        source: &dyn CalendarSource,
        now: DateTime<Utc>,
    ) -> Result<usize, RoomError> {
        let calendar_id = self.state.lock().await.calendar_id.clone();
        if calendar_id.is_empty() {
            return Err(RoomError::Config {
                room_id: self.room_id.clone(),
                reason: "calendar-id is not set".to_string(),
            });
        }

        let events = source.fetch_events(&calendar_id, now).await?;
        let count = events.len();

        let mut state = self.state.lock().await;
        state.events = Arc::new(events);
        state.events_fetched_at = Some(now);
        Ok(count)
    }

    /// Marks both caches as never fetched.
    pub async fn expire_caches(&self) {
        let mut state = self.state.lock().await;
        state.config_fetched_at = None;
        state.events_fetched_at = None;
    }

    async fn load_bool_pref(&self, prefs: &dyn PrefStore, key: &str) -> bool {
        let raw = match prefs.get_pref(&self.room_id, key).await {
            Ok(Some(v)) => v,
            Ok(None) => return false,
            Err(err) => {
                warn!(room_id = %self.room_id, key, error = %err, "unable to read boolean pref");
                return false;
            }
        };
        parse_bool_pref(raw.trim()).unwrap_or_else(|err| {
            warn!(room_id = %self.room_id, key, error = %err, "unable to parse boolean pref value");
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::MemoryCalendar;
    use crate::clock::ManualClock;
    use crate::error::FetchError;
    use crate::store::SharedStore;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn prefs() -> SharedStore {
        SharedStore::memory(Arc::new(ManualClock::new(at(10, 0))))
    }

    fn standup() -> Event {
        Event {
            name: "standup".to_string(),
            description: String::new(),
            start: at(10, 0),
            end: at(11, 0),
        }
    }

    #[tokio::test]
    async fn fresh_room_is_unfetched() {
        let room = RoomConfig::new("ops");
        let snap = room.snapshot().await;
        assert_eq!(snap.config_fetched_at, None);
        assert_eq!(snap.events_fetched_at, None);
        assert!(snap.events.is_empty());
        assert_eq!(snap.timezone.name(), DEFAULT_TIMEZONE);
    }

    #[tokio::test]
    async fn reload_reads_all_prefs() {
        let store = prefs();
        store.set_pref("ops", "calendar-id", "cal-1").await.unwrap();
        store.set_pref("ops", "autoreply", "true").await.unwrap();
        store.set_pref("ops", "announce-end", "1").await.unwrap();
        store.set_pref("ops", "timezone", "Europe/Berlin").await.unwrap();

        let room = RoomConfig::new("ops");
        room.reload_config(&store, at(10, 0)).await.unwrap();

        let snap = room.snapshot().await;
        assert_eq!(snap.calendar_id, "cal-1");
        assert!(snap.autoreply);
        assert!(!snap.announce_start);
        assert!(snap.announce_end);
        assert_eq!(snap.timezone, Tz::Europe__Berlin);
        assert_eq!(snap.config_fetched_at, Some(at(10, 0)));
    }

    #[tokio::test]
    async fn unparseable_bool_defaults_to_false() {
        let store = prefs();
        store.set_pref("ops", "calendar-id", "cal-1").await.unwrap();
        store.set_pref("ops", "autoreply", "sure").await.unwrap();

        let room = RoomConfig::new("ops");
        room.reload_config(&store, at(10, 0)).await.unwrap();
        assert!(!room.autoreply().await);
    }

    #[tokio::test]
    async fn missing_calendar_id_is_config_error() {
        let room = RoomConfig::new("ops");
        let err = room.reload_config(&prefs(), at(10, 0)).await.unwrap_err();
        assert!(matches!(err, RoomError::Config { .. }));
        assert_eq!(room.config_fetched_at().await, None);
    }

    #[tokio::test]
    async fn bad_timezone_keeps_earlier_fields_but_not_stamp() {
        let store = prefs();
        store.set_pref("ops", "calendar-id", "cal-1").await.unwrap();
        store.set_pref("ops", "autoreply", "true").await.unwrap();
        store.set_pref("ops", "timezone", "Mars/Olympus").await.unwrap();

        let room = RoomConfig::new("ops");
        let err = room.reload_config(&store, at(10, 0)).await.unwrap_err();
        assert!(matches!(err, RoomError::Timezone { ref name, .. } if name == "Mars/Olympus"));

        let snap = room.snapshot().await;
        assert_eq!(snap.calendar_id, "cal-1");
        assert!(snap.autoreply);
        assert_eq!(snap.config_fetched_at, None);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_events_and_stamp() {
        let store = prefs();
        store.set_pref("ops", "calendar-id", "cal-1").await.unwrap();
        let room = RoomConfig::new("ops");
        room.reload_config(&store, at(9, 0)).await.unwrap();

        let calendar = MemoryCalendar::new(vec![standup()]);
        assert_eq!(room.refresh_events(&calendar, at(9, 0)).await.unwrap(), 1);
        let before = room.snapshot().await;

        calendar.fail_with(FetchError::Status(503));
        let err = room.refresh_events(&calendar, at(9, 10)).await.unwrap_err();
        assert_eq!(err, RoomError::Fetch(FetchError::Status(503)));

        let after = room.snapshot().await;
        assert_eq!(after.events, before.events);
        assert_eq!(after.events_fetched_at, Some(at(9, 0)));
    }

    #[tokio::test]
    async fn refresh_without_calendar_id_does_not_fetch() {
        let room = RoomConfig::new("ops");
        let calendar = MemoryCalendar::new(vec![standup()]);
        assert!(room.refresh_events(&calendar, at(9, 0)).await.is_err());
        assert_eq!(calendar.fetch_count(), 0);
    }

    #[tokio::test]
    async fn expire_resets_both_stamps() {
        let store = prefs();
        store.set_pref("ops", "calendar-id", "cal-1").await.unwrap();
        let room = RoomConfig::new("ops");
        room.reload_config(&store, at(9, 0)).await.unwrap();
        room.refresh_events(&MemoryCalendar::new(vec![standup()]), at(9, 0))
            .await
            .unwrap();

        room.expire_caches().await;
        let snap = room.snapshot().await;
        assert_eq!(snap.config_fetched_at, None);
        assert_eq!(snap.events_fetched_at, None);
        assert_eq!(snap.events.len(), 1);
    }
}
