use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::ports::{Clock, KvStore, PrefStore};

/// Preference and TTL key/value storage behind a single lock, shared by every
/// room. Expiry is judged against the injected clock.
#[derive(Clone)]
pub struct SharedStore {
    backend: Arc<Mutex<StoreBackend>>,
    clock: Arc<dyn Clock>,
}

enum StoreBackend {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

#[derive(Default)]
struct MemoryStore {
    prefs: HashMap<String, String>,
    kv: HashMap<String, KvEntry>,
}

#[derive(Debug, Clone)]
struct KvEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

struct SqliteStore {
    conn: Connection,
}

impl SharedStore {
    pub fn memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            backend: Arc::new(Mutex::new(StoreBackend::Memory(MemoryStore::default()))),
            clock,
        }
    }

    pub fn sqlite(path: &str, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        Ok(Self {
            backend: Arc::new(Mutex::new(StoreBackend::Sqlite(SqliteStore::new(path)?))),
            clock,
        })
    }
}

#[async_trait]
impl PrefStore for SharedStore {
    async fn get_pref(&self, room_id: &str, key: &str) -> Result<Option<String>, StoreError> {
        let backend = self.backend.lock().await;
        match &*backend {
            StoreBackend::Memory(store) => Ok(store.prefs.get(&pref_key(room_id, key)).cloned()),
            StoreBackend::Sqlite(store) => store.get_pref(room_id, key),
        }
    }

    async fn set_pref(&self, room_id: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let mut backend = self.backend.lock().await;
        match &mut *backend {
            StoreBackend::Memory(store) => {
                store
                    .prefs
                    .insert(pref_key(room_id, key), value.to_string());
                Ok(())
            }
            StoreBackend::Sqlite(store) => store.set_pref(room_id, key, value),
        }
    }
}

#[async_trait]
impl KvStore for SharedStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let mut backend = self.backend.lock().await;
        match &mut *backend {
            StoreBackend::Memory(store) => match store.kv.get(key) {
                Some(entry) if now < entry.expires_at => Ok(Some(entry.value.clone())),
                Some(_) => {
                    store.kv.remove(key);
                    Ok(None)
                }
                None => Ok(None),
            },
            StoreBackend::Sqlite(store) => store.get_kv(key, now),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError(format!("ttl out of range: {e}")))?;
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .ok_or_else(|| StoreError("ttl out of range".to_string()))?;

        let mut backend = self.backend.lock().await;
        match &mut *backend {
            StoreBackend::Memory(store) => {
                store.kv.insert(
                    key.to_string(),
                    KvEntry {
                        value: value.to_string(),
                        expires_at,
                    },
                );
                Ok(())
            }
            StoreBackend::Sqlite(store) => store.set_kv(key, value, expires_at),
        }
    }
}

impl SqliteStore {
    fn new(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS prefs (
                room_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (room_id, key)
            );
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at_ms INTEGER NOT NULL
            );
            ",
        )?;
        Ok(Self { conn })
    }

    fn get_pref(&self, room_id: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM prefs WHERE room_id = ?1 AND key = ?2",
                params![room_id, key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_pref(&mut self, room_id: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "
            INSERT INTO prefs(room_id, key, value) VALUES (?1, ?2, ?3)
            ON CONFLICT(room_id, key) DO UPDATE SET value=excluded.value
            ",
            params![room_id, key, value],
        )?;
        Ok(())
    }

    fn get_kv(&mut self, key: &str, now: DateTime<Utc>) -> Result<Option<String>, StoreError> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT value, expires_at_ms FROM kv WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((value, expires_at_ms)) if now.timestamp_millis() < expires_at_ms => {
                Ok(Some(value))
            }
            Some(_) => {
                self.conn
                    .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set_kv(
        &mut self,
        key: &str,
        value: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "
            INSERT INTO kv(key, value, expires_at_ms) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value=excluded.value,
                expires_at_ms=excluded.expires_at_ms
            ",
            params![key, value, expires_at.timestamp_millis()],
        )?;
        Ok(())
    }
}

fn pref_key(room_id: &str, key: &str) -> String {
    format!("{room_id}:{key}")
}
