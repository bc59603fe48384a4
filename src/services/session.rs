//! Ephemeral dialogue sessions.
//!
//! Sessions live behind the `SessionStore` trait so the engine never
//! touches a process-global map; the default implementation is an
//! in-memory table with an idle TTL (the reference behavior had no
//! expiry, which grows without bound).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Idle sessions are dropped after this long.
pub const SESSION_TTL_MIN: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub tenant_id: i64,
    pub participant: String,
}

impl SessionKey {
    pub fn new(tenant_id: i64, participant: impl Into<String>) -> Self {
        Self {
            tenant_id,
            participant: participant.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NeedType,
    NeedDateTime,
    Confirming,
}

/// In-progress booking dialogue for one (tenant, participant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub state: SessionState,
    pub category: Option<String>,
    pub title: String,
    pub starts_at: Option<NaiveDateTime>,
    pub description: String,
    /// The message that opened the session, kept for the booking notes.
    pub opened_with: String,
}

pub trait SessionStore: Send + Sync {
    fn get(&self, key: &SessionKey) -> Option<Session>;
    fn put(&self, key: SessionKey, session: Session, now: NaiveDateTime);
    fn remove(&self, key: &SessionKey);
    /// Drops idle entries, returns how many were removed.
    fn purge_expired(&self, now: NaiveDateTime) -> usize;
    /// Per-key mutex serializing message processing for one participant.
    fn lock_for(&self, key: &SessionKey) -> Arc<tokio::sync::Mutex<()>>;
}

struct Entry {
    session: Session,
    last_activity: NaiveDateTime,
}

#[derive(Default)]
pub struct InMemorySessionStore {
    entries: Mutex<HashMap<SessionKey, Entry>>,
    locks: Mutex<HashMap<SessionKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, key: &SessionKey) -> Option<Session> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .map(|e| e.session.clone())
    }

    fn put(&self, key: SessionKey, session: Session, now: NaiveDateTime) {
        self.entries.lock().unwrap().insert(
            key,
            Entry {
                session,
                last_activity: now,
            },
        );
    }

    fn remove(&self, key: &SessionKey) {
        self.entries.lock().unwrap().remove(key);
    }

    fn purge_expired(&self, now: NaiveDateTime) -> usize {
        let cutoff = now - Duration::minutes(SESSION_TTL_MIN);
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, e| e.last_activity > cutoff);
        let removed = before - entries.len();

        // Locks for keys with no live session can go too; a concurrent
        // holder keeps its Arc alive regardless.
        let mut locks = self.locks.lock().unwrap();
        locks.retain(|key, lock| entries.contains_key(key) || Arc::strong_count(lock) > 1);

        removed
    }

    fn lock_for(&self, key: &SessionKey) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
