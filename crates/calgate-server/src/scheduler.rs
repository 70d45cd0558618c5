use std::sync::Arc;
use std::time::Duration;

use calgate_kernel::{REFRESH_INTERVAL, REFRESH_STARTUP_DELAY};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RoomError;
use crate::ports::Collaborators;
use crate::room::RoomConfig;

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub startup_delay: Duration,
    pub interval: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            startup_delay: REFRESH_STARTUP_DELAY,
            interval: REFRESH_INTERVAL,
        }
    }
}

#[derive(Debug)]
pub struct TickReport {
    pub config: Result<(), RoomError>,
    pub events: Result<usize, RoomError>,
}

/// Background refresh loop for one room. Dropping the task cancels it.
pub struct RefreshTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RefreshTask {
    pub fn spawn(room: Arc<RoomConfig>, collab: Collaborators, schedule: Schedule) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(refresh_loop(room, collab, schedule, cancel.clone()));
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    #[cfg(test)]
    pub(crate) fn from_parts(cancel: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Cancels the loop and waits for an in-flight tick to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                warn!("refresh task did not stop within {:?}", STOP_TIMEOUT);
            }
        }
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn refresh_loop(
    room: Arc<RoomConfig>,
    collab: Collaborators,
    schedule: Schedule,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(schedule.startup_delay) => {}
    }

    loop {
        run_tick(&room, &collab).await;
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(schedule.interval) => {}
        }
    }
    debug!(room_id = %room.room_id(), "refresh loop stopped");
}

/// One scheduled refresh: best-effort config reload, then an unconditional
/// event refresh. Errors are logged and reported, never propagated.
pub async fn run_tick(room: &RoomConfig, collab: &Collaborators) -> TickReport {
    let room_id = room.room_id();
    let now = collab.clock.now();
    info!(room_id, "START: refresh calendar cache");

    let config = room.reload_config(collab.prefs.as_ref(), now).await;
    if let Err(err) = &config {
        warn!(room_id, error = %err, "config reload failed, keeping previous config");
    }

    let events = room.refresh_events(collab.calendar.as_ref(), now).await;
    match &events {
        Ok(count) => info!(room_id, count, "DONE: refresh calendar cache"),
        Err(err) => warn!(room_id, error = %err, "FAILED: refresh calendar cache"),
    }

    TickReport { config, events }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::ports::PrefStore;
    use crate::test_support::{at, standup, Fixture};

    #[tokio::test]
    async fn tick_reloads_config_and_refreshes_events() {
        let fx = Fixture::new(vec![standup()]).await;
        let room = RoomConfig::new("ops");

        let report = run_tick(&room, &fx.collab).await;
        assert!(report.config.is_ok());
        assert_eq!(report.events, Ok(1));

        let snap = room.snapshot().await;
        assert_eq!(snap.config_fetched_at, Some(at(10, 0)));
        assert_eq!(snap.events_fetched_at, Some(at(10, 0)));
        assert_eq!(snap.events.len(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_last_good_cache() {
        let fx = Fixture::new(vec![standup()]).await;
        let room = RoomConfig::new("ops");
        run_tick(&room, &fx.collab).await;
        let before = room.snapshot().await;

        fx.clock.set(at(10, 10));
        fx.calendar.fail_with(FetchError::Transport("timeout".to_string()));
        let report = run_tick(&room, &fx.collab).await;
        assert!(report.events.is_err());

        let after = room.snapshot().await;
        assert_eq!(after.events, before.events);
        assert_eq!(after.events_fetched_at, Some(at(10, 0)));
        assert_eq!(after.config_fetched_at, Some(at(10, 10)));
    }

    #[tokio::test]
    async fn config_failure_still_refreshes_events() {
        let fx = Fixture::new(vec![standup()]).await;
        let room = RoomConfig::new("ops");
        run_tick(&room, &fx.collab).await;

        fx.store
            .set_pref("ops", "timezone", "Not/AZone")
            .await
            .unwrap();
        fx.clock.set(at(10, 10));
        let report = run_tick(&room, &fx.collab).await;
        assert!(matches!(report.config, Err(RoomError::Timezone { .. })));
        assert_eq!(report.events, Ok(1));
        assert_eq!(room.events_fetched_at().await, Some(at(10, 10)));
        assert_eq!(fx.calendar.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_waits_for_startup_delay_then_ticks_each_interval() {
        let fx = Fixture::new(vec![standup()]).await;
        let room = Arc::new(RoomConfig::new("ops"));
        let task = RefreshTask::spawn(room.clone(), fx.collab.clone(), Schedule::default());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fx.calendar.fetch_count(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fx.calendar.fetch_count(), 1);

        tokio::time::sleep(REFRESH_INTERVAL).await;
        assert_eq!(fx.calendar.fetch_count(), 2);

        task.stop().await;
        tokio::time::sleep(REFRESH_INTERVAL * 3).await;
        assert_eq!(fx.calendar.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_task_before_startup_prevents_any_tick() {
        let fx = Fixture::new(vec![standup()]).await;
        let room = Arc::new(RoomConfig::new("ops"));
        let task = RefreshTask::spawn(room, fx.collab.clone(), Schedule::default());
        drop(task);

        tokio::time::sleep(REFRESH_INTERVAL).await;
        assert_eq!(fx.calendar.fetch_count(), 0);
    }
}
