use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::conversation::ConversationLog;

pub type SharedLog = Arc<Mutex<ConversationLog>>;

/// Sessions idle for longer than this are dropped.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Most sessions kept at once; the least recently used one goes first.
pub const DEFAULT_SESSION_CAPACITY: usize = 10_000;

struct SessionEntry {
    log: SharedLog,
    last_seen: Instant,
}

/// One transcript per browser session, kept in memory only.
///
/// Callers hold the per-session lock for a whole interaction, so actions
/// within one session run one after another. Retention is bounded by an
/// idle timeout and a capacity cap.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, SessionEntry>>>,
    ttl: Duration,
    capacity: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_SESSION_TTL, DEFAULT_SESSION_CAPACITY)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Transcript for an existing, unexpired session. Never creates one.
    pub async fn get(&self, id: Option<Uuid>) -> Option<SharedLog> {
        let id = id?;
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        match sessions.get_mut(&id) {
            Some(entry) if now.duration_since(entry.last_seen) <= self.ttl => {
                entry.last_seen = now;
                Some(entry.log.clone())
            }
            Some(_) => {
                debug!(%id, "chat session expired");
                sessions.remove(&id);
                None
            }
            None => None,
        }
    }

    /// Transcript for `id`, creating a new session when `id` is absent,
    /// unknown or expired. Returns the id actually used.
    pub async fn get_or_create(&self, id: Option<Uuid>) -> (Uuid, SharedLog) {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        let ttl = self.ttl;
        sessions.retain(|_, entry| now.duration_since(entry.last_seen) <= ttl);

        if let Some(id) = id {
            if let Some(entry) = sessions.get_mut(&id) {
                entry.last_seen = now;
                return (id, entry.log.clone());
            }
        }

        while sessions.len() >= self.capacity {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| *id);
            match oldest {
                Some(oldest) => {
                    debug!(id = %oldest, "evicting least recently used chat session");
                    sessions.remove(&oldest);
                }
                None => break,
            }
        }

        let id = id.unwrap_or_else(Uuid::new_v4);
        debug!(%id, "creating chat session");
        let log = SharedLog::default();
        sessions.insert(
            id,
            SessionEntry {
                log: log.clone(),
                last_seen: now,
            },
        );
        (id, log)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
