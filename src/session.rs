//! In-memory per-user conversation history.
//!
//! One [`SessionStore`] is built at startup and shared as `Arc<SessionStore>`.
//! Each user gets a bounded FIFO of [`Turn`]s: appends past `cap` silently
//! drop the oldest turns.  Nothing is persisted; history is lost on restart.
//!
//! Every operation takes the map lock once and releases it before returning,
//! so each call is atomic and no lock is ever held across an `.await`.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Platform-scoped user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire name used by chat-completion APIs.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

pub struct SessionStore {
    cap: usize,
    sessions: Mutex<HashMap<UserId, VecDeque<Turn>>>,
}

impl SessionStore {
    /// `cap` is clamped to at least one turn.
    pub fn new(cap: usize) -> Self {
        Self { cap: cap.max(1), sessions: Mutex::new(HashMap::new()) }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Append a turn, creating the session on first use.
    pub fn append_turn(&self, user_id: &UserId, role: Role, text: impl Into<String>) {
        let mut sessions = self.lock();
        push_capped(sessions.entry(user_id.clone()).or_default(), Turn { role, content: text.into() }, self.cap);
    }

    /// Append a turn and return the resulting history, under one lock.
    pub fn append_and_snapshot(&self, user_id: &UserId, role: Role, text: impl Into<String>) -> Vec<Turn> {
        let mut sessions = self.lock();
        let history = sessions.entry(user_id.clone()).or_default();
        push_capped(history, Turn { role, content: text.into() }, self.cap);
        history.iter().cloned().collect()
    }

    /// Ordered copy of the user's history; empty for unknown users.
    pub fn get_history(&self, user_id: &UserId) -> Vec<Turn> {
        self.lock()
            .get(user_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Reset the user's history to empty. Safe to call repeatedly.
    pub fn clear(&self, user_id: &UserId) {
        if let Some(history) = self.lock().get_mut(user_id) {
            history.clear();
        }
    }

    pub fn len(&self, user_id: &UserId) -> usize {
        self.lock().get(user_id).map_or(0, VecDeque::len)
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    // A panic while holding the lock cannot leave a VecDeque half-updated in
    // a way that matters here, so a poisoned lock is simply recovered.
    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, VecDeque<Turn>>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn push_capped(history: &mut VecDeque<Turn>, turn: Turn, cap: usize) {
    history.push_back(turn);
    while history.len() > cap {
        history.pop_front();
    }
}
