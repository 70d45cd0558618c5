use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use calgate_contracts::Event;
use chrono::{DateTime, Utc};

use crate::error::{FetchError, StoreError};

#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Events relevant at `as_of`, in the order the calendar returns them.
    async fn fetch_events(
        &self,
        calendar_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Event>, FetchError>;
}

/// Per-room preferences. `Ok(None)` means the key is unset.
#[async_trait]
pub trait PrefStore: Send + Sync {
    async fn get_pref(&self, room_id: &str, key: &str) -> Result<Option<String>, StoreError>;
    async fn set_pref(&self, room_id: &str, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Key/value store whose entries disappear once their TTL elapses.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone)]
pub struct Collaborators {
    pub calendar: Arc<dyn CalendarSource>,
    pub prefs: Arc<dyn PrefStore>,
    pub kv: Arc<dyn KvStore>,
    pub clock: Arc<dyn Clock>,
}
