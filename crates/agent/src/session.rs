//! Bounded, per-session conversation state.
//!
//! Contexts live in an LRU cache keyed by session id and expire after an idle
//! TTL. Each context sits behind its own async mutex; a turn holds that lock
//! from classification until its history entry is written, so turns for one
//! session never interleave while different sessions proceed independently.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agrivision_core::config::SessionConfig;
use agrivision_core::domain::context::{ChatContext, Role};
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

pub type SharedContext = Arc<Mutex<ChatContext>>;

#[derive(Debug)]
struct SessionEntry {
    context: SharedContext,
    last_seen: Instant,
}

impl SessionEntry {
    /// A turn or snapshot still holds a handle to this context.
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.context) > 1
    }

    fn expired(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.last_seen) >= ttl && !self.in_use()
    }
}

/// Contexts that are in use are never evicted or expired; the cache grows
/// past `capacity` while every entry is busy and shrinks back afterwards.
pub struct SessionStore {
    cache: Mutex<LruCache<String, SessionEntry>>,
    capacity: NonZeroUsize,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self { cache: Mutex::new(LruCache::new(capacity)), capacity, ttl }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self::new(capacity, Duration::from_secs(config.ttl_secs))
    }

    /// Returns the context for `session_id`, creating it with `role` when the
    /// session is new or its previous context expired.
    pub async fn acquire(&self, session_id: &str, role: Role) -> SharedContext {
        let mut cache = self.cache.lock().await;
        let now = Instant::now();

        if let Some(entry) = cache.get_mut(session_id) {
            if !entry.expired(now, self.ttl) {
                entry.last_seen = now;
                return Arc::clone(&entry.context);
            }
        }

        cache.pop(session_id);
        self.make_room(&mut cache);

        let context = Arc::new(Mutex::new(ChatContext::new(role)));
        cache.put(
            session_id.to_string(),
            SessionEntry { context: Arc::clone(&context), last_seen: now },
        );
        debug!(event_name = "agent.session.created", session_id, role = ?role, "session created");
        context
    }

    /// Existing, unexpired context for `session_id`; never creates one.
    pub async fn get(&self, session_id: &str) -> Option<SharedContext> {
        let mut cache = self.cache.lock().await;
        let now = Instant::now();

        let entry = cache.get_mut(session_id)?;
        if entry.expired(now, self.ttl) {
            cache.pop(session_id);
            return None;
        }
        entry.last_seen = now;
        Some(Arc::clone(&entry.context))
    }

    /// Drops every idle-expired session and returns how many were removed.
    pub async fn prune_expired(&self) -> usize {
        let mut cache = self.cache.lock().await;
        let now = Instant::now();

        let expired: Vec<String> = cache
            .iter()
            .filter(|(_, entry)| entry.expired(now, self.ttl))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            cache.pop(key);
        }
        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Frees one slot for a new session, evicting the least recently used
    /// idle contexts first.
    fn make_room(&self, cache: &mut LruCache<String, SessionEntry>) {
        while cache.len() >= self.capacity.get() {
            let idle = cache
                .iter()
                .rev()
                .find(|(_, entry)| !entry.in_use())
                .map(|(key, _)| key.clone());
            let Some(key) = idle else { break };
            cache.pop(&key);
            debug!(event_name = "agent.session.evicted", session_id = %key, "evicted");
        }

        let needed = (cache.len() + 1).max(self.capacity.get());
        let target = NonZeroUsize::new(needed).unwrap_or(self.capacity);
        if target != cache.cap() {
            cache.resize(target);
        }
    }
}
