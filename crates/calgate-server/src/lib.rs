pub mod calendar;
pub mod clock;
pub mod commands;
pub mod engine;
pub mod error;
pub mod freshness;
pub mod ports;
pub mod registry;
pub mod room;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod suppression;

#[cfg(test)]
mod test_support;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use calgate_config::Config;
use calgate_contracts::{CacheStatus, ChatEvent, ChatEventResponse, PrefValue, RoomRegistration};
use calgate_kernel::PREF_KEYS;
use serde_json::{json, Value};
use tracing::info;

use crate::calendar::HttpCalendarSource;
use crate::clock::SystemClock;
use crate::error::RoomError;
use crate::ports::{Clock, Collaborators};
use crate::service::GateService;
use crate::store::SharedStore;

type ApiError = (StatusCode, Json<Value>);

pub async fn serve<F>(cfg: Config, shutdown: F) -> Result<(), String>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let service = build_service(&cfg).await?;
    let app = router(service.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    info!(%addr, rooms = cfg.rooms.len(), "calgate listening");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| format!("serve failed: {e}"));

    service.shutdown().await;
    info!("refresh tasks stopped");
    served
}

pub async fn build_app(cfg: Config) -> Result<Router, String> {
    Ok(router(build_service(&cfg).await?))
}

/// Wires the configured store and calendar source into a service and
/// registers the rooms listed in the config.
pub async fn build_service(cfg: &Config) -> Result<Arc<GateService>, String> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = if cfg.store.kind == "sqlite" {
        let sqlite_path = cfg
            .store
            .sqlite_path
            .as_deref()
            .ok_or_else(|| "store.sqlite_path is required for sqlite store".to_string())?;
        SharedStore::sqlite(sqlite_path, clock.clone()).map_err(|e| e.to_string())?
    } else {
        SharedStore::memory(clock.clone())
    };
    let calendar = HttpCalendarSource::new(
        &cfg.calendar.endpoint,
        Duration::from_millis(cfg.calendar.timeout_ms),
    )
    .map_err(|e| e.to_string())?;

    let service = Arc::new(GateService::new(Collaborators {
        calendar: Arc::new(calendar),
        prefs: Arc::new(store.clone()),
        kv: Arc::new(store),
        clock,
    }));
    for room_id in &cfg.rooms {
        service.register_room(room_id).await;
    }
    Ok(service)
}

pub fn router(service: Arc<GateService>) -> Router {
    Router::new()
        .route("/v1/healthz", get(healthz))
        .route("/v1/rooms", post(register_room))
        .route("/v1/rooms/{room_id}/prefs/{key}", put(set_pref))
        .route("/v1/rooms/{room_id}/status", get(room_status))
        .route("/v1/events", post(events))
        .with_state(service)
}

fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(json!({"error": {"code": code, "message": message.into()}})),
    )
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn register_room(
    State(service): State<Arc<GateService>>,
    Json(req): Json<RoomRegistration>,
) -> Result<(StatusCode, Json<CacheStatus>), ApiError> {
    let room_id = req.room_id.trim();
    if room_id.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "room_id must not be empty",
        ));
    }
    let created = service.register_room(room_id).await;
    let status = service.status(room_id).await.map_err(room_error)?;
    let code = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((code, Json(status)))
}

async fn set_pref(
    State(service): State<Arc<GateService>>,
    Path((room_id, key)): Path<(String, String)>,
    Json(req): Json<PrefValue>,
) -> Result<StatusCode, ApiError> {
    if !PREF_KEYS.iter().any(|k| *k == key) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("unknown preference {key:?}; expected one of {}", PREF_KEYS.join(", ")),
        ));
    }
    service
        .set_pref(&room_id, &key, &req.value)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn room_status(
    State(service): State<Arc<GateService>>,
    Path(room_id): Path<String>,
) -> Result<Json<CacheStatus>, ApiError> {
    service.status(&room_id).await.map(Json).map_err(room_error)
}

async fn events(
    State(service): State<Arc<GateService>>,
    Json(event): Json<ChatEvent>,
) -> Result<Json<ChatEventResponse>, ApiError> {
    if event.room_id.trim().is_empty() || event.user_id.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "room_id and user_id are required",
        ));
    }
    if service.registry().get(&event.room_id).await.is_none() {
        return Err(room_error(RoomError::UnknownRoom(event.room_id)));
    }
    Ok(Json(service.handle_chat(&event).await))
}

fn room_error(err: RoomError) -> ApiError {
    match err {
        RoomError::UnknownRoom(_) => api_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        other => api_error(StatusCode::BAD_REQUEST, "room_error", other.to_string()),
    }
}
