//! Per-user conversation memory.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::turn::Turn;
use crate::user::UserId;

/// Maximum number of turns kept per user.
pub const MAX_TURNS: usize = 20;
/// Silence after which a conversation is forgotten.
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(1800);

/// Trim and expiry policy for sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// History cap, oldest turns dropped first
    pub max_turns: usize,
    /// Gap between messages that clears history
    pub inactivity_timeout: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_turns: MAX_TURNS,
            inactivity_timeout: INACTIVITY_TIMEOUT,
        }
    }
}

/// A user's conversation state.
#[derive(Debug, Clone)]
struct Session {
    history: Vec<Turn>,
    last_activity: Instant,
}

impl Session {
    fn new(now: Instant) -> Self {
        Self {
            history: Vec::new(),
            last_activity: now,
        }
    }

    fn push(&mut self, turn: Turn, max_turns: usize) {
        self.history.push(turn);
        if self.history.len() > max_turns {
            let excess = self.history.len() - max_turns;
            self.history.drain(..excess);
        }
    }
}

/// The context to send for an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTurn {
    /// Full history including the new user turn
    pub context: Vec<Turn>,
    /// Whether earlier history was dropped for inactivity
    pub was_auto_reset: bool,
}

/// Owns every user's conversation state.
///
/// Sessions are created on first contact and never removed. Expiry is
/// checked lazily when the next message arrives. Each operation holds the
/// user's map entry for its whole read-modify-write and hands back owned
/// snapshots, so no lock outlives the call.
pub struct SessionStore {
    sessions: DashMap<UserId, Session>,
    policy: SessionPolicy,
}

impl SessionStore {
    /// Create a store with the default policy (20 turns, 30 minutes).
    pub fn new() -> Self {
        Self::with_policy(SessionPolicy::default())
    }

    /// Create a store with a custom policy.
    pub fn with_policy(policy: SessionPolicy) -> Self {
        Self {
            sessions: DashMap::new(),
            policy,
        }
    }

    /// Record an inbound message and return the context to send for it.
    pub fn prepare_turn(&self, user: UserId, text: &str, now: Instant) -> PreparedTurn {
        let mut session = self.sessions.entry(user).or_insert_with(|| {
            debug!(user = %user, "Creating new session");
            Session::new(now)
        });

        let idle = now.saturating_duration_since(session.last_activity);
        let was_auto_reset =
            !session.history.is_empty() && idle > self.policy.inactivity_timeout;
        if was_auto_reset {
            debug!(
                user = %user,
                idle_secs = idle.as_secs(),
                dropped = session.history.len(),
                "Session expired, clearing history"
            );
            session.history.clear();
        }

        session.last_activity = now;
        session.push(Turn::user(text), self.policy.max_turns);

        trace!(user = %user, turns = session.history.len(), "Prepared turn");

        PreparedTurn {
            context: session.history.clone(),
            was_auto_reset,
        }
    }

    /// Append the backend's reply to the user's history.
    ///
    /// A reply for a user with no session is dropped; replies only follow
    /// [`SessionStore::prepare_turn`].
    pub fn record_reply(&self, user: UserId, text: &str) {
        let Some(mut session) = self.sessions.get_mut(&user) else {
            debug!(user = %user, "Dropping reply for unknown session");
            return;
        };

        session.push(Turn::assistant(text), self.policy.max_turns);

        trace!(user = %user, turns = session.history.len(), "Recorded reply");
    }

    /// Clear the user's history. Returns `false` if there was nothing to clear.
    pub fn manual_reset(&self, user: UserId, now: Instant) -> bool {
        let Some(mut session) = self.sessions.get_mut(&user) else {
            return false;
        };

        if session.history.is_empty() {
            return false;
        }

        debug!(user = %user, dropped = session.history.len(), "Session reset by user");
        session.history.clear();
        session.last_activity = now;
        true
    }

    /// A snapshot of the user's history.
    pub fn history(&self, user: UserId) -> Option<Vec<Turn>> {
        self.sessions.get(&user).map(|s| s.history.clone())
    }

    /// When the user was last active.
    pub fn last_activity(&self, user: UserId) -> Option<Instant> {
        self.sessions.get(&user).map(|s| s.last_activity)
    }

    /// The configured policy.
    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    const U: UserId = UserId(100);

    fn contents(turns: &[Turn]) -> Vec<&str> {
        turns.iter().map(|t| t.content.as_str()).collect()
    }

    #[test]
    fn test_first_turn_has_only_new_message() {
        let store = SessionStore::new();
        let prepared = store.prepare_turn(U, "hi", Instant::now());

        assert!(!prepared.was_auto_reset);
        assert_eq!(prepared.context, vec![Turn::user("hi")]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_context_accumulates() {
        let store = SessionStore::new();
        let t0 = Instant::now();

        store.prepare_turn(U, "hi", t0);
        store.record_reply(U, "hello");
        let prepared = store.prepare_turn(U, "bye", t0 + Duration::from_secs(10));

        assert!(!prepared.was_auto_reset);
        assert_eq!(
            prepared.context,
            vec![Turn::user("hi"), Turn::assistant("hello"), Turn::user("bye")]
        );
    }

    #[test]
    fn test_inactivity_clears_history() {
        let store = SessionStore::new();
        let t0 = Instant::now();

        store.prepare_turn(U, "first", t0);
        store.record_reply(U, "reply");

        let later = t0 + INACTIVITY_TIMEOUT + Duration::from_secs(1);
        let prepared = store.prepare_turn(U, "again", later);

        assert!(prepared.was_auto_reset);
        assert_eq!(prepared.context, vec![Turn::user("again")]);
        assert_eq!(store.last_activity(U), Some(later));
    }

    #[test]
    fn test_gap_of_exactly_timeout_keeps_history() {
        let store = SessionStore::new();
        let t0 = Instant::now();

        store.prepare_turn(U, "first", t0);
        let prepared = store.prepare_turn(U, "second", t0 + INACTIVITY_TIMEOUT);

        assert!(!prepared.was_auto_reset);
        assert_eq!(prepared.context.len(), 2);
    }

    #[test]
    fn test_expiry_measured_from_last_message() {
        let store = SessionStore::new();
        let t0 = Instant::now();
        let step = Duration::from_secs(1000);

        store.prepare_turn(U, "a", t0);
        store.prepare_turn(U, "b", t0 + step);
        let prepared = store.prepare_turn(U, "c", t0 + step * 2);

        assert!(!prepared.was_auto_reset);
        assert_eq!(contents(&prepared.context), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_history_capped_at_twenty_turns() {
        let store = SessionStore::new();
        let t0 = Instant::now();

        for i in 0..11u64 {
            store.prepare_turn(U, &format!("q{i}"), t0 + Duration::from_secs(i));
            store.record_reply(U, &format!("a{i}"));
        }

        let history = store.history(U).unwrap();
        assert_eq!(history.len(), 20);

        let expected: Vec<Turn> = (1..11)
            .flat_map(|i| [Turn::user(format!("q{i}")), Turn::assistant(format!("a{i}"))])
            .collect();
        assert_eq!(history, expected);
    }

    #[test]
    fn test_context_never_exceeds_cap() {
        let store = SessionStore::with_policy(SessionPolicy {
            max_turns: 4,
            inactivity_timeout: INACTIVITY_TIMEOUT,
        });
        let t0 = Instant::now();

        for i in 0..2 {
            store.prepare_turn(U, &format!("q{i}"), t0);
            store.record_reply(U, &format!("a{i}"));
        }
        let prepared = store.prepare_turn(U, "q2", t0);

        assert_eq!(contents(&prepared.context), vec!["a0", "q1", "a1", "q2"]);
    }

    #[test]
    fn test_reply_without_session_is_dropped() {
        let store = SessionStore::new();
        store.record_reply(U, "orphan");

        assert!(store.is_empty());
        assert_eq!(store.history(U), None);
    }

    #[test]
    fn test_manual_reset_without_history() {
        let store = SessionStore::new();
        assert!(!store.manual_reset(U, Instant::now()));
        assert!(store.is_empty());
    }

    #[test]
    fn test_manual_reset_clears_history() {
        let store = SessionStore::new();
        let t0 = Instant::now();

        store.prepare_turn(U, "hi", t0);
        store.record_reply(U, "hello");

        let reset_at = t0 + Duration::from_secs(5);
        assert!(store.manual_reset(U, reset_at));
        assert_eq!(store.history(U), Some(vec![]));
        assert_eq!(store.last_activity(U), Some(reset_at));

        let prepared = store.prepare_turn(U, "fresh", t0 + Duration::from_secs(6));
        assert!(!prepared.was_auto_reset);
        assert_eq!(prepared.context, vec![Turn::user("fresh")]);

        // A second reset right after has something to clear again
        assert!(store.manual_reset(U, t0 + Duration::from_secs(7)));
        assert!(!store.manual_reset(U, t0 + Duration::from_secs(8)));
    }

    #[test]
    fn test_users_have_separate_sessions() {
        let store = SessionStore::new();
        let t0 = Instant::now();
        let other = UserId(200);

        store.prepare_turn(U, "mine", t0);
        let prepared = store.prepare_turn(other, "theirs", t0);

        assert_eq!(prepared.context, vec![Turn::user("theirs")]);
        assert_eq!(store.history(U).unwrap()[0].role, Role::User);
        assert_eq!(store.len(), 2);
    }
}
