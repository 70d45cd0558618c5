use std::sync::Arc;

use calgate_contracts::Event;
use chrono::{DateTime, TimeZone, Utc};

use crate::calendar::MemoryCalendar;
use crate::clock::ManualClock;
use crate::ports::{Collaborators, PrefStore};
use crate::store::SharedStore;

pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
}

pub fn standup() -> Event {
    Event {
        name: "standup".to_string(),
        description: String::new(),
        start: at(10, 0),
        end: at(11, 0),
    }
}

pub struct Fixture {
    pub calendar: Arc<MemoryCalendar>,
    pub store: SharedStore,
    pub clock: Arc<ManualClock>,
    pub collab: Collaborators,
}

impl Fixture {
    /// Room `ops` configured with a calendar id and autoreply on; clock at 10:00.
    pub async fn new(events: Vec<Event>) -> Self {
        let clock = Arc::new(ManualClock::new(at(10, 0)));
        let store = SharedStore::memory(clock.clone());
        store.set_pref("ops", "calendar-id", "cal-ops").await.unwrap();
        store.set_pref("ops", "autoreply", "true").await.unwrap();
        let calendar = Arc::new(MemoryCalendar::new(events));
        let collab = Collaborators {
            calendar: calendar.clone(),
            prefs: Arc::new(store.clone()),
            kv: Arc::new(store.clone()),
            clock: clock.clone(),
        };
        Self {
            calendar,
            store,
            clock,
            collab,
        }
    }
}
