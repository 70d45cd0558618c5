use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use calgate_contracts::Event;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::ports::CalendarSource;

/// Calendar source backed by an HTTP endpoint serving
/// `GET {endpoint}/calendars/{id}/events?as_of=<rfc3339>`.
pub struct HttpCalendarSource {
    endpoint: Url,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Vec<Event>,
}

impl HttpCalendarSource {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, FetchError> {
        let endpoint = Url::parse(endpoint).map_err(|e| FetchError::Endpoint(e.to_string()))?;
        if endpoint.cannot_be_a_base() {
            return Err(FetchError::Endpoint(format!(
                "{endpoint} cannot be used as a base url"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { endpoint, client })
    }

    fn events_url(&self, calendar_id: &str) -> Result<Url, FetchError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Endpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(["calendars", calendar_id, "events"]);
        Ok(url)
    }
}

#[async_trait]
impl CalendarSource for HttpCalendarSource {
    async fn fetch_events(
        &self,
        calendar_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Event>, FetchError> {
        let url = self.events_url(calendar_id)?;
        let response = self
            .client
            .get(url)
            .query(&[("as_of", as_of.to_rfc3339())])
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body: EventsResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        let total = body.events.len();
        let events: Vec<Event> = body
            .events
            .into_iter()
            .filter(|e| {
                if !e.is_well_formed() {
                    warn!(
                        calendar_id,
                        event = %e.name,
                        "dropping event that ends before it starts"
                    );
                }
                e.is_well_formed()
            })
            .collect();
        debug!(calendar_id, total, kept = events.len(), "calendar events fetched");
        Ok(events)
    }
}

/// In-process calendar holding a fixed list of events. Counts fetches and can
/// be switched into a failing mode.
#[derive(Debug)]
pub struct MemoryCalendar {
    events: Mutex<Result<Vec<Event>, FetchError>>,
    fetches: AtomicUsize,
}

impl MemoryCalendar {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: Mutex::new(Ok(events)),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fail_with(&self, err: FetchError) {
        *self.events.lock().unwrap_or_else(|p| p.into_inner()) = Err(err);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CalendarSource for MemoryCalendar {
    async fn fetch_events(
        &self,
        _calendar_id: &str,
        _as_of: DateTime<Utc>,
    ) -> Result<Vec<Event>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}
