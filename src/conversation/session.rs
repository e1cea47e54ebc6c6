//! # Conversation Session Management
//!
//! Each caller gets an isolated conversation, keyed by the `X-Session-Id`
//! header. A session holds the ordered turns exchanged so far; the whole
//! history (within the retrieval window) is replayed to the model on every
//! request so it can "remember" earlier questions.
//!
//! ## Session Lifecycle:
//! 1. **Created**: on the first request carrying a new id (or no id at all)
//! 2. **Active**: every completed exchange appends a user and an assistant turn
//! 3. **Evicted**: idle longer than `session.idle_timeout_secs`, or deleted explicitly
//!
//! ## Thread Safety:
//! The id -> session map sits behind a `std::sync::RwLock` and is only held
//! for short, non-async sections. The history of each session sits behind a
//! `tokio::sync::Mutex` that an exchange holds across the provider call, so
//! two requests on the same session are answered one after the other while
//! different sessions proceed in parallel.

use crate::conversation::turn::Turn;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use uuid::Uuid;

const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Invalid session id '{0}': expected 1-128 characters of [A-Za-z0-9_-]")]
    InvalidId(String),
    #[error("Maximum concurrent sessions ({0}) reached")]
    CapacityReached(usize),
}

/// One caller's conversation with the assistant.
pub struct ConversationSession {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    last_active_at: RwLock<DateTime<Utc>>,
    history: Mutex<Vec<Turn>>,
}

impl ConversationSession {
    fn new(session_id: String) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            created_at: now,
            last_active_at: RwLock::new(now),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Take exclusive access to the history for one exchange.
    ///
    /// Waits while another exchange on this session is in flight.
    pub async fn lock_history(&self) -> MutexGuard<'_, Vec<Turn>> {
        let guard = self.history.lock().await;
        self.touch();
        guard
    }

    pub fn touch(&self) {
        *self
            .last_active_at
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Utc::now();
    }

    pub fn last_active_at(&self) -> DateTime<Utc> {
        *self
            .last_active_at
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// True while an exchange holds the history lock.
    pub fn is_busy(&self) -> bool {
        self.history.try_lock().is_err()
    }

    pub async fn turn_count(&self) -> usize {
        self.history.lock().await.len()
    }

    fn idle_longer_than(&self, now: DateTime<Utc>, max_idle: Duration) -> bool {
        let idle = now.signed_duration_since(self.last_active_at());
        idle.num_milliseconds() > max_idle.as_millis() as i64
    }
}

/// Summary of the store for health and metrics reporting.
#[derive(Debug)]
pub struct SessionStoreSummary {
    pub total_sessions: usize,
    pub busy_sessions: usize,
    pub max_sessions: usize,
}

/// Manages all live conversation sessions.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<ConversationSession>>>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Resolve the session for a request.
    ///
    /// ## Returns:
    /// - the existing session when `requested` names a live one
    /// - a new session under `requested` when it names an unknown one
    /// - a new session under a fresh UUID when `requested` is `None`
    ///
    /// The flag is true when the session was created by this call. An
    /// existing session is touched so the reaper leaves it alone while the
    /// request waits for its history.
    pub fn get_or_create(
        &self,
        requested: Option<&str>,
    ) -> Result<(Arc<ConversationSession>, bool), SessionError> {
        if let Some(id) = requested {
            if !is_valid_session_id(id) {
                return Err(SessionError::InvalidId(id.to_string()));
            }
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(session) = requested.and_then(|id| sessions.get(id)) {
            session.touch();
            return Ok((Arc::clone(session), false));
        }

        if sessions.len() >= self.max_sessions {
            return Err(SessionError::CapacityReached(self.max_sessions));
        }

        let session_id = requested
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let session = Arc::new(ConversationSession::new(session_id.clone()));
        sessions.insert(session_id, Arc::clone(&session));

        Ok((session, true))
    }

    /// Remove `session` if nothing was ever recorded in it and the caller
    /// holds the only handle outside the store.
    ///
    /// Used when the exchange that created a session fails, so the session
    /// does not hold a capacity slot the client was never told about.
    pub fn discard_if_unused(&self, session: &Arc<ConversationSession>) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        let stored = match sessions.get(&session.session_id) {
            Some(stored) if Arc::ptr_eq(stored, session) => stored,
            _ => return false,
        };
        // The store's handle plus the caller's
        if Arc::strong_count(stored) > 2 {
            return false;
        }
        let unused = match session.history.try_lock() {
            Ok(history) => history.is_empty(),
            Err(_) => false,
        };
        if unused {
            sessions.remove(&session.session_id);
        }
        unused
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<ConversationSession>> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(session_id).cloned()
    }

    pub fn remove(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop sessions idle longer than `max_idle`. Sessions with an exchange
    /// in flight are never evicted.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();

        sessions.retain(|_, session| session.is_busy() || !session.idle_longer_than(now, max_idle));

        before - sessions.len()
    }

    /// Evict idle sessions every `interval` for as long as the runtime lives.
    pub fn spawn_reaper(
        self: Arc<Self>,
        idle_timeout: Duration,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let evicted = self.evict_idle(idle_timeout);
                if evicted > 0 {
                    info!(evicted, remaining = self.len(), "Evicted idle sessions");
                } else {
                    debug!(active = self.len(), "No idle sessions to evict");
                }
            }
        })
    }

    pub fn summary(&self) -> SessionStoreSummary {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        SessionStoreSummary {
            total_sessions: sessions.len(),
            busy_sessions: sessions.values().filter(|s| s.is_busy()).count(),
            max_sessions: self.max_sessions,
        }
    }
}

pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
