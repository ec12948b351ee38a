//! Encrypting and decrypting messages for friends.
//!
//! Send:    MK, n = ratchet.next_sending()
//!          AD    = {version, sessionId, from: me, to: friend, msgIndex: n, sentAt}
//!          (iv, ct, tag) = AES-256-GCM(MK, plaintext, AD)
//!
//! Receive: AD is taken from the envelope, checked against the expected
//!          parties and index, re-serialised and bound into the tag check.
//!          The receiving chain advances only after the tag verifies.
//!
//! Own sent messages are read back with the key cached at send time, or by
//! replaying a throwaway sending chain up to `header.n`.

use chrono::Utc;

use danaid_crypto::aead;
use danaid_crypto::ratchet::MessageKey;
use danaid_crypto::SessionManager;
use danaid_proto::{AssociatedData, MessageEnvelope, MessageHeader, PROTOCOL_VERSION};

use crate::error::ClientError;

pub struct Messenger {
    sessions: SessionManager,
}

impl Messenger {
    pub fn new(me: &str) -> Self {
        Self {
            sessions: SessionManager::new(me),
        }
    }

    pub fn me(&self) -> &str {
        self.sessions.me()
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Drop the conversation state for `friend`. Both sides must reset for
    /// the chains to line up again.
    pub fn reset(&self, friend: &str) -> bool {
        self.sessions.reset(friend)
    }

    pub fn encrypt_for_friend(
        &self,
        friend: &str,
        plaintext: &str,
    ) -> Result<MessageEnvelope, ClientError> {
        let session = self.sessions.get_or_create_session(friend);
        let mut session = session.lock();

        let (message_key, n) = session.next_sending_message_key();
        let now = Utc::now().timestamp_millis();
        let header = MessageHeader {
            n,
            pn: session.pn(),
            timestamp: now,
        };
        let ad = AssociatedData {
            version: PROTOCOL_VERSION,
            session_id: session.session_id().to_string(),
            from: self.me().to_string(),
            to: friend.to_string(),
            msg_index: n,
            sent_at: now,
        };
        let sealed = aead::encrypt(message_key.as_bytes(), plaintext.as_bytes(), &ad.to_bytes()?)?;

        tracing::debug!(
            target: "danaid_client",
            event = "message_encrypted",
            to = %friend,
            session_id = %ad.session_id,
            n,
            len = plaintext.len(),
        );
        Ok(MessageEnvelope::from_sealed(header, &sealed, ad))
    }

    pub fn decrypt_from_friend(
        &self,
        friend: &str,
        envelope: &MessageEnvelope,
    ) -> Result<String, ClientError> {
        self.check_context(envelope, friend, self.me())?;
        let sealed = envelope.sealed_box()?;
        let ad_bytes = envelope.ad.to_bytes()?;

        let session = self.sessions.get_or_create_session(friend);
        let mut session = session.lock();

        let pending = session.prepare_receive();
        if pending.index() != envelope.header.n {
            tracing::warn!(
                target: "danaid_client",
                event = "message_out_of_order",
                from = %friend,
                expected = pending.index(),
                got = envelope.header.n,
            );
            return Err(ClientError::OutOfOrder {
                expected: pending.index(),
                got: envelope.header.n,
            });
        }

        let plaintext = match aead::decrypt(pending.message_key().as_bytes(), &sealed, &ad_bytes) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::warn!(
                    target: "danaid_client",
                    event = "message_auth_failed",
                    from = %friend,
                    n = envelope.header.n,
                );
                return Err(e.into());
            }
        };
        let nr = session.commit_receive(pending)?;

        tracing::debug!(
            target: "danaid_client",
            event = "message_decrypted",
            from = %friend,
            nr,
        );
        String::from_utf8(plaintext.to_vec()).map_err(|_| ClientError::InvalidUtf8)
    }

    /// Decrypt a message we sent to `friend` earlier. Live counters are not
    /// touched.
    pub fn decrypt_own_sent(
        &self,
        friend: &str,
        envelope: &MessageEnvelope,
    ) -> Result<String, ClientError> {
        self.check_context(envelope, self.me(), friend)?;
        let sealed = envelope.sealed_box()?;
        let ad_bytes = envelope.ad.to_bytes()?;

        let message_key = self.own_message_key(friend, envelope.header.n)?;
        let plaintext = aead::decrypt(message_key.as_bytes(), &sealed, &ad_bytes)?;
        String::from_utf8(plaintext.to_vec()).map_err(|_| ClientError::InvalidUtf8)
    }

    fn own_message_key(&self, friend: &str, n: u64) -> Result<MessageKey, ClientError> {
        if self.sessions.has_session(friend) {
            let session = self.sessions.get_or_create_session(friend);
            let cached = session.lock().cached_sent_key(n);
            if let Some(key) = cached {
                return Ok(key);
            }
        }
        tracing::debug!(
            target: "danaid_client",
            event = "own_message_replay",
            to = %friend,
            n,
        );
        Ok(self.sessions.replay_sent_key(friend, n)?)
    }

    fn check_context(
        &self,
        envelope: &MessageEnvelope,
        from: &str,
        to: &str,
    ) -> Result<(), ClientError> {
        let ad = &envelope.ad;
        let problem = if ad.version != PROTOCOL_VERSION {
            Some(format!("version {}", ad.version))
        } else if ad.from != from {
            Some(format!("sender {:?}, expected {from:?}", ad.from))
        } else if ad.to != to {
            Some(format!("recipient {:?}, expected {to:?}", ad.to))
        } else if ad.msg_index != envelope.header.n {
            Some(format!(
                "msgIndex {} does not match header n {}",
                ad.msg_index, envelope.header.n
            ))
        } else {
            None
        };
        match problem {
            Some(problem) => {
                tracing::warn!(
                    target: "danaid_client",
                    event = "message_context_rejected",
                    me = %self.me(),
                    problem = %problem,
                );
                Err(ClientError::ContextMismatch(problem))
            }
            None => Ok(()),
        }
    }
}
