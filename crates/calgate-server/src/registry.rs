use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::room::RoomConfig;
use crate::scheduler::RefreshTask;

/// Room id to [`RoomConfig`] mapping. Entries are created on first use and
/// live until the registry is dropped.
///
/// The registry lock only guards the map itself; it is never held while a
/// room refreshes.
#[derive(Default)]
pub struct ConfigRegistry {
    rooms: Mutex<HashMap<String, RoomSlot>>,
}

struct RoomSlot {
    config: Arc<RoomConfig>,
    refresh: Option<RefreshTask>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the room's config, creating an unfetched one on first call.
    /// Every caller for the same room gets the same instance.
    pub async fn get_or_create(&self, room_id: &str) -> Arc<RoomConfig> {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| RoomSlot {
                config: Arc::new(RoomConfig::new(room_id)),
                refresh: None,
            })
            .config
            .clone()
    }

    pub async fn get(&self, room_id: &str) -> Option<Arc<RoomConfig>> {
        self.rooms
            .lock()
            .await
            .get(room_id)
            .map(|slot| slot.config.clone())
    }

    /// Like [`get_or_create`](Self::get_or_create), and additionally attaches
    /// a refresh task built by `spawn` if the room has none yet. Returns
    /// whether a task was attached by this call.
    pub async fn get_or_schedule<F>(&self, room_id: &str, spawn: F) -> (Arc<RoomConfig>, bool)
    where
        F: FnOnce(Arc<RoomConfig>) -> RefreshTask,
    {
        let mut rooms = self.rooms.lock().await;
        let slot = rooms
            .entry(room_id.to_string())
            .or_insert_with(|| RoomSlot {
                config: Arc::new(RoomConfig::new(room_id)),
                refresh: None,
            });
        if slot.refresh.is_some() {
            return (slot.config.clone(), false);
        }
        slot.refresh = Some(spawn(slot.config.clone()));
        (slot.config.clone(), true)
    }

    pub async fn is_scheduled(&self, room_id: &str) -> bool {
        self.rooms
            .lock()
            .await
            .get(room_id)
            .map(|slot| slot.refresh.is_some())
            .unwrap_or(false)
    }

    pub async fn room_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rooms.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stops every refresh task. Room configs stay readable.
    pub async fn shutdown(&self) {
        let tasks: Vec<RefreshTask> = self
            .rooms
            .lock()
            .await
            .values_mut()
            .filter_map(|slot| slot.refresh.take())
            .collect();
        for task in tasks {
            task.stop().await;
        }
    }
}
