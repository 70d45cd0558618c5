use std::sync::Arc;
use std::time::Duration;

use calgate_contracts::{CacheStatus, ChatEvent, ChatEventResponse, NotifyDecision};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::commands::{
    parse_command, silence_reply, status_reply, unknown_room_reply, Command, CommandError, USAGE,
};
use crate::engine::DecisionEngine;
use crate::error::{RoomError, StoreError};
use crate::ports::Collaborators;
use crate::registry::ConfigRegistry;
use crate::scheduler::{run_tick, RefreshTask, Schedule, TickReport};

/// Everything the HTTP layer talks to: room registration, preferences,
/// decisions and operator commands over one shared registry.
pub struct GateService {
    registry: Arc<ConfigRegistry>,
    collab: Collaborators,
    engine: DecisionEngine,
    schedule: Schedule,
}

impl GateService {
    pub fn new(collab: Collaborators) -> Self {
        Self::with_schedule(collab, Schedule::default())
    }

    pub fn with_schedule(collab: Collaborators, schedule: Schedule) -> Self {
        let registry = Arc::new(ConfigRegistry::new());
        let engine = DecisionEngine::new(registry.clone(), collab.clone());
        Self {
            registry,
            collab,
            engine,
            schedule,
        }
    }

    pub fn registry(&self) -> &Arc<ConfigRegistry> {
        &self.registry
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.collab.clock.now()
    }

    /// Registers a room and starts its refresh task. Returns `false` if the
    /// room already had one.
    pub async fn register_room(&self, room_id: &str) -> bool {
        let collab = self.collab.clone();
        let schedule = self.schedule;
        let (_, scheduled) = self
            .registry
            .get_or_schedule(room_id, |room| RefreshTask::spawn(room, collab, schedule))
            .await;
        if scheduled {
            info!(room_id, "room registered, refresh scheduled");
        }
        scheduled
    }

    pub async fn set_pref(&self, room_id: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.collab.prefs.set_pref(room_id, key, value).await
    }

    pub async fn evaluate(&self, room_id: &str, user_id: &str) -> NotifyDecision {
        self.engine.evaluate(room_id, user_id, self.now()).await
    }

    pub async fn status(&self, room_id: &str) -> Result<CacheStatus, RoomError> {
        let room = self
            .registry
            .get(room_id)
            .await
            .ok_or_else(|| RoomError::UnknownRoom(room_id.to_string()))?;
        Ok(room.snapshot().await.status(self.now()))
    }

    pub async fn expire(&self, room_id: &str) -> Result<(), RoomError> {
        let room = self
            .registry
            .get(room_id)
            .await
            .ok_or_else(|| RoomError::UnknownRoom(room_id.to_string()))?;
        room.expire_caches().await;
        info!(room_id, "caches expired");
        Ok(())
    }

    /// Expires both caches, then runs one refresh tick in place.
    pub async fn reload(&self, room_id: &str) -> Result<TickReport, RoomError> {
        let room = self
            .registry
            .get(room_id)
            .await
            .ok_or_else(|| RoomError::UnknownRoom(room_id.to_string()))?;
        room.expire_caches().await;
        Ok(run_tick(&room, &self.collab).await)
    }

    pub async fn silence(&self, room_id: &str, duration: Duration) -> Result<(), StoreError> {
        self.engine.suppression().silence(room_id, duration).await?;
        info!(room_id, ?duration, "room silenced");
        Ok(())
    }

    /// Routes one chat message: `!gcal` commands get a command reply, other
    /// `!` commands are ignored, anything else is evaluated as activity.
    pub async fn handle_chat(&self, event: &ChatEvent) -> ChatEventResponse {
        let body = event.body.trim();
        if body.is_empty() {
            return ChatEventResponse::default();
        }

        if body.starts_with('!') {
            let Some(command) = parse_command(body) else {
                return ChatEventResponse::default();
            };
            let reply = self
                .run_command(&event.room_id, &event.user_id, command)
                .await;
            return ChatEventResponse {
                reply: Some(reply),
                decision: None,
            };
        }

        let decision = self.evaluate(&event.room_id, &event.user_id).await;
        let reply = match &decision {
            NotifyDecision::ConfigUnavailable { reason }
            | NotifyDecision::EventsUnavailable { reason } => {
                Some(format!("Error while getting calendar data: {reason}"))
            }
            NotifyDecision::Notify { message } => Some(message.clone()),
            _ => None,
        };
        ChatEventResponse {
            reply,
            decision: Some(decision),
        }
    }

    async fn run_command(
        &self,
        room_id: &str,
        user_id: &str,
        command: Result<Command, CommandError>,
    ) -> String {
        let command = match command {
            Ok(Command::Help) => return USAGE.to_string(),
            Ok(command) => command,
            Err(err) => return err.to_string(),
        };
        info!(room_id, user_id, ?command, "operator command");

        if self.registry.get(room_id).await.is_none() {
            return unknown_room_reply(room_id);
        }

        let outcome = match command {
            Command::Status => self.status(room_id).await.map(|s| status_reply(&s)),
            Command::Expire => self
                .expire(room_id)
                .await
                .map(|()| "config & calendar caches expired".to_string()),
            Command::Reload => self
                .reload(room_id)
                .await
                .map(|_| "reload complete".to_string()),
            Command::Silence(duration) => {
                return match self.silence(room_id, duration).await {
                    Ok(()) => silence_reply(duration),
                    Err(err) => {
                        warn!(room_id, error = %err, "silence failed");
                        format!("Failed to silence notifications: {err}")
                    }
                };
            }
            Command::Help => Ok(USAGE.to_string()),
        };
        outcome.unwrap_or_else(|err| match err {
            RoomError::UnknownRoom(room_id) => unknown_room_reply(&room_id),
            other => other.to_string(),
        })
    }

    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}
