//! Per-friend ratchet sessions for the logged-in user.
//!
//! One `SessionManager` exists per signed-in user. Sessions are created
//! lazily with the deterministic pair root key and live in memory only;
//! nothing here is persisted across restarts.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::CryptoError;
use crate::kdf::{self, KEY_LEN};
use crate::ratchet::{MessageKey, RatchetSession};

pub type SharedSession = Arc<Mutex<RatchetSession>>;

pub struct SessionManager {
    me: String,
    sessions: Mutex<HashMap<String, SharedSession>>,
}

impl SessionManager {
    pub fn new(me: impl Into<String>) -> Self {
        Self {
            me: me.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn me(&self) -> &str {
        &self.me
    }

    /// Root key both sides of the `{me, friend}` pair derive independently.
    pub fn derive_initial_root_key(&self, friend: &str) -> [u8; KEY_LEN] {
        kdf::pair_root_key(&self.me, friend)
    }

    /// Return the session for `friend`, creating and initialising it on first
    /// use. Repeated calls hand back the same shared session.
    pub fn get_or_create_session(&self, friend: &str) -> SharedSession {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(friend) {
            return Arc::clone(existing);
        }

        let mut session =
            RatchetSession::new(&self.me, friend, Some(self.derive_initial_root_key(friend)));
        session.init_chains();
        tracing::info!(
            target: "danaid_crypto",
            event = "session_created",
            me = %self.me,
            friend = %friend,
            session_id = %session.session_id(),
        );

        let shared = Arc::new(Mutex::new(session));
        sessions.insert(friend.to_string(), Arc::clone(&shared));
        shared
    }

    /// Drop the session for `friend`; the next call to
    /// `get_or_create_session` starts both chains from zero again.
    /// Returns whether a session existed.
    pub fn reset(&self, friend: &str) -> bool {
        let removed = self.sessions.lock().remove(friend).is_some();
        if removed {
            tracing::info!(
                target: "danaid_crypto",
                event = "session_reset",
                me = %self.me,
                friend = %friend,
            );
        }
        removed
    }

    pub fn has_session(&self, friend: &str) -> bool {
        self.sessions.lock().contains_key(friend)
    }

    /// Message key for our own sent message `n` to `friend`, computed on a
    /// throwaway sending chain. Live session counters are left untouched.
    pub fn replay_sent_key(&self, friend: &str, n: u64) -> Result<MessageKey, CryptoError> {
        let root = self.derive_initial_root_key(friend);
        RatchetSession::replay_sent_key(&self.me, friend, &root, n)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("me", &self.me)
            .field("sessions", &self.sessions.lock().len())
            .finish()
    }
}
