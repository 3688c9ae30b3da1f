//! Session lifecycle and per-session event history.
//!
//! Sessions are in-memory only: an opaque id, a last-access timestamp, and
//! (when resumability is enabled) a bounded history of formatted SSE events
//! used to replay missed traffic after a `Last-Event-ID` reconnect.
//!
//! All operations are mutually exclusive behind one lock; `validate` and
//! `add_event` are called from both the reactor and worker threads.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

/// Session manager configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle time after which a session is dead.
    pub timeout: Duration,
    /// When false, `add_event` is a no-op and replay is always empty.
    pub resumability_enabled: bool,
    /// Cap on retained events per session; oldest evicted first.
    pub max_history_size: usize,
    /// Events older than this are evicted regardless of count.
    pub history_duration: Duration,
    /// Cap on live sessions.
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3600),
            resumability_enabled: true,
            max_history_size: 1000,
            history_duration: Duration::from_millis(300_000),
            max_sessions: 4096,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session capacity exceeded ({0} live sessions)")]
    CapacityExceeded(usize),
}

#[derive(Debug)]
struct HistoryEntry {
    event_id: String,
    payload: String,
    recorded_at: Instant,
}

#[derive(Debug)]
struct SessionEntry {
    last_access: Instant,
    history: VecDeque<HistoryEntry>,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            last_access: Instant::now(),
            history: VecDeque::new(),
        }
    }
}

/// Thread-safe session table.
#[derive(Debug)]
pub struct SessionManager {
    config: SessionConfig,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Create a session and return its id.
    ///
    /// At capacity, expired sessions are purged first; if the table is
    /// still full the call fails with [`SessionError::CapacityExceeded`].
    pub fn create(&self) -> Result<String, SessionError> {
        let mut sessions = self.sessions.lock();
        if sessions.len() >= self.config.max_sessions {
            Self::purge_expired(&mut sessions, self.config.timeout);
            if sessions.len() >= self.config.max_sessions {
                return Err(SessionError::CapacityExceeded(sessions.len()));
            }
        }
        let mut id = generate_session_id();
        // CSPRNG collisions are not a practical concern, but uniqueness
        // among live sessions is an invariant, so enforce it anyway.
        while sessions.contains_key(&id) {
            id = generate_session_id();
        }
        sessions.insert(id.clone(), SessionEntry::new());
        debug!(session_id = %id, "session created");
        Ok(id)
    }

    /// True iff the session exists and has not expired; refreshes
    /// `last_access` on success and drops the entry when expired.
    pub fn validate(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(entry) = sessions.get_mut(id) else {
            return false;
        };
        if entry.last_access.elapsed() > self.config.timeout {
            sessions.remove(id);
            debug!(session_id = %id, "session expired on validate");
            return false;
        }
        entry.last_access = Instant::now();
        true
    }

    /// Non-mutating liveness check: does not refresh `last_access`.
    pub fn contains(&self, id: &str) -> bool {
        let sessions = self.sessions.lock();
        sessions
            .get(id)
            .is_some_and(|entry| entry.last_access.elapsed() <= self.config.timeout)
    }

    /// Remove a session. Returns whether it existed.
    pub fn terminate(&self, id: &str) -> bool {
        let removed = self.sessions.lock().remove(id).is_some();
        if removed {
            debug!(session_id = %id, "session terminated");
        }
        removed
    }

    /// Record a formatted event for replay. No-op when resumability is
    /// disabled or the session is unknown.
    pub fn add_event(&self, id: &str, event_id: &str, formatted_event: &str) {
        if !self.config.resumability_enabled {
            return;
        }
        let mut sessions = self.sessions.lock();
        let Some(entry) = sessions.get_mut(id) else {
            return;
        };
        entry.history.push_back(HistoryEntry {
            event_id: event_id.to_string(),
            payload: formatted_event.to_string(),
            recorded_at: Instant::now(),
        });
        while entry.history.len() > self.config.max_history_size {
            entry.history.pop_front();
        }
        let horizon = self.config.history_duration;
        while entry
            .history
            .front()
            .is_some_and(|e| e.recorded_at.elapsed() > horizon)
        {
            entry.history.pop_front();
        }
    }

    /// Events recorded after `last_event_id`, in order.
    ///
    /// An empty id returns the full history; an unknown id returns nothing
    /// (the client is beyond our horizon and replay would be wrong).
    pub fn events_since(&self, id: &str, last_event_id: &str) -> Vec<String> {
        let sessions = self.sessions.lock();
        let Some(entry) = sessions.get(id) else {
            return Vec::new();
        };
        if last_event_id.is_empty() {
            return entry.history.iter().map(|e| e.payload.clone()).collect();
        }
        match entry.history.iter().position(|e| e.event_id == last_event_id) {
            Some(idx) => entry
                .history
                .iter()
                .skip(idx + 1)
                .map(|e| e.payload.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Drop every expired session; returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let removed = Self::purge_expired(&mut sessions, self.config.timeout);
        if removed > 0 {
            info!(removed, "expired sessions purged");
        }
        removed
    }

    /// Number of live (possibly stale, not yet purged) sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    fn purge_expired(sessions: &mut HashMap<String, SessionEntry>, timeout: Duration) -> usize {
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_access.elapsed() <= timeout);
        before - sessions.len()
    }
}

/// `session-<ms since epoch hex>-<64-bit random>-<64-bit random>`, with the
/// randomness from the thread-local CSPRNG.
fn generate_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let mut rng = rand::rng();
    format!(
        "session-{:x}-{:016x}-{:016x}",
        millis,
        rng.random::<u64>(),
        rng.random::<u64>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with(config: SessionConfig) -> SessionManager {
        SessionManager::new(config)
    }

    #[test]
    fn lifecycle() {
        let manager = manager_with(SessionConfig::default());
        let id = manager.create().unwrap();
        assert!(id.starts_with("session-"));
        assert!(manager.validate(&id));
        assert!(manager.terminate(&id));
        assert!(!manager.validate(&id));
        assert!(!manager.terminate(&id));
    }

    #[test]
    fn ids_are_unique() {
        let manager = manager_with(SessionConfig::default());
        let mut seen = std::collections::HashSet::new();
        for _ in 0..256 {
            assert!(seen.insert(manager.create().unwrap()));
        }
    }

    #[test]
    fn validate_expires_sessions() {
        let manager = manager_with(SessionConfig {
            timeout: Duration::from_millis(20),
            ..SessionConfig::default()
        });
        let id = manager.create().unwrap();
        std::thread::sleep(Duration::from_millis(60));
        assert!(!manager.validate(&id));
        // Expired entry was removed as a side effect.
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn validate_refreshes_last_access() {
        let manager = manager_with(SessionConfig {
            timeout: Duration::from_millis(120),
            ..SessionConfig::default()
        });
        let id = manager.create().unwrap();
        for _ in 0..4 {
            std::thread::sleep(Duration::from_millis(50));
            assert!(manager.validate(&id));
        }
    }

    #[test]
    fn capacity_purges_then_fails() {
        let manager = manager_with(SessionConfig {
            max_sessions: 2,
            ..SessionConfig::default()
        });
        manager.create().unwrap();
        manager.create().unwrap();
        assert!(matches!(
            manager.create(),
            Err(SessionError::CapacityExceeded(2))
        ));

        // With a tiny timeout the purge path frees room.
        let manager = manager_with(SessionConfig {
            max_sessions: 2,
            timeout: Duration::from_millis(10),
            ..SessionConfig::default()
        });
        manager.create().unwrap();
        manager.create().unwrap();
        std::thread::sleep(Duration::from_millis(40));
        assert!(manager.create().is_ok());
    }

    #[test]
    fn history_replay_semantics() {
        let manager = manager_with(SessionConfig::default());
        let id = manager.create().unwrap();
        manager.add_event(&id, "1", "data: a\n\n");
        manager.add_event(&id, "2", "data: b\n\n");
        manager.add_event(&id, "3", "data: c\n\n");

        assert_eq!(
            manager.events_since(&id, ""),
            vec!["data: a\n\n", "data: b\n\n", "data: c\n\n"]
        );
        assert_eq!(
            manager.events_since(&id, "1"),
            vec!["data: b\n\n", "data: c\n\n"]
        );
        // Most recent id: nothing to replay.
        assert!(manager.events_since(&id, "3").is_empty());
        // Unknown id: empty, not an error.
        assert!(manager.events_since(&id, "99").is_empty());
        // Unknown session: empty.
        assert!(manager.events_since("nope", "").is_empty());

        // Adding one more and replaying from the previously newest id
        // returns exactly the new event.
        manager.add_event(&id, "4", "data: d\n\n");
        assert_eq!(manager.events_since(&id, "3"), vec!["data: d\n\n"]);
    }

    #[test]
    fn history_is_bounded() {
        let manager = manager_with(SessionConfig {
            max_history_size: 3,
            ..SessionConfig::default()
        });
        let id = manager.create().unwrap();
        for i in 0..5 {
            manager.add_event(&id, &i.to_string(), &format!("data: {i}\n\n"));
        }
        let all = manager.events_since(&id, "");
        assert_eq!(all, vec!["data: 2\n\n", "data: 3\n\n", "data: 4\n\n"]);
    }

    #[test]
    fn history_age_eviction() {
        let manager = manager_with(SessionConfig {
            history_duration: Duration::from_millis(20),
            ..SessionConfig::default()
        });
        let id = manager.create().unwrap();
        manager.add_event(&id, "1", "data: old\n\n");
        std::thread::sleep(Duration::from_millis(60));
        manager.add_event(&id, "2", "data: new\n\n");
        assert_eq!(manager.events_since(&id, ""), vec!["data: new\n\n"]);
    }

    #[test]
    fn resumability_disabled_is_a_noop() {
        let manager = manager_with(SessionConfig {
            resumability_enabled: false,
            ..SessionConfig::default()
        });
        let id = manager.create().unwrap();
        manager.add_event(&id, "1", "data: a\n\n");
        assert!(manager.events_since(&id, "").is_empty());
    }

    #[test]
    fn cleanup_expired_batch() {
        let manager = manager_with(SessionConfig {
            timeout: Duration::from_millis(10),
            ..SessionConfig::default()
        });
        manager.create().unwrap();
        manager.create().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(manager.cleanup_expired(), 2);
        assert!(manager.is_empty());
    }
}
