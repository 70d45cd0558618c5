use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("calendar request failed: {0}")]
    Transport(String),
    #[error("calendar responded with HTTP {0}")]
    Status(u16),
    #[error("calendar response could not be decoded: {0}")]
    Decode(String),
    #[error("invalid calendar endpoint: {0}")]
    Endpoint(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("store backend failed: {0}")]
pub struct StoreError(pub String);

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError(err.to_string())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("room {0:?} is not registered")]
    UnknownRoom(String),
    #[error("failed to load calendar-id preference for room {room_id:?}: {reason}")]
    Config { room_id: String, reason: String },
    #[error("could not load timezone info for {name:?}: {reason}")]
    Timezone { name: String, reason: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
}
