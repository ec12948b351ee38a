//! Login challenges: random nonces that are handed out once and claimed once.
//!
//! `take` removes the entry whether or not the login that follows succeeds,
//! so a nonce can never be signed twice. Expiry is checked by the caller
//! after `take`. Entries live in memory only; a restart drops them all.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::RngCore;

use danaid_crypto::codec::b64_encode;

use crate::config::DEFAULT_CHALLENGE_TTL_SECS;
use crate::error::AuthError;

pub const CHALLENGE_ID_LEN: usize = 16;
pub const NONCE_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub username: String,
    /// Base64 text the client must sign, exactly as issued.
    pub nonce_b64: String,
    pub created_at: DateTime<Utc>,
}

pub struct ChallengeStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, Challenge>>,
}

impl Default for ChallengeStore {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_CHALLENGE_TTL_SECS as i64))
    }
}

impl ChallengeStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a challenge for `username`. Returns `(challenge_id, nonce_b64)`.
    pub fn create(&self, username: &str) -> (String, String) {
        self.create_at(username, Utc::now())
    }

    pub fn create_at(&self, username: &str, created_at: DateTime<Utc>) -> (String, String) {
        let mut rng = rand::rngs::OsRng;
        let mut id = [0u8; CHALLENGE_ID_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut id);
        rng.fill_bytes(&mut nonce);

        let challenge_id = hex::encode(id);
        let nonce_b64 = b64_encode(nonce);
        self.entries.lock().insert(
            challenge_id.clone(),
            Challenge {
                username: username.to_string(),
                nonce_b64: nonce_b64.clone(),
                created_at,
            },
        );
        (challenge_id, nonce_b64)
    }

    /// Remove and return the challenge. A second `take` of the same id is
    /// `NotFound`.
    pub fn take(&self, challenge_id: &str) -> Result<Challenge, AuthError> {
        self.entries
            .lock()
            .remove(challenge_id)
            .ok_or_else(|| AuthError::NotFound("challenge".into()))
    }

    pub fn is_expired(&self, challenge: &Challenge) -> bool {
        self.is_expired_at(challenge, Utc::now())
    }

    pub fn is_expired_at(&self, challenge: &Challenge, now: DateTime<Utc>) -> bool {
        now - challenge.created_at > self.ttl
    }

    /// Drop unclaimed challenges past their TTL. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, c| now - c.created_at <= self.ttl);
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!(target: "danaid_auth", event = "challenges_purged", purged);
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
