//! Per-conversation symmetric key ratchet.
//!
//! State separation:
//!   RK  — root key (fixed for the lifetime of the session)
//!   CKs — sending chain key (advanced per sent message)
//!   CKr — receiving chain key (advanced per received message)
//!   MK  — message key (derived from CK, used once)
//!
//! Chain derivation:
//!   CKs = KDF(RK, send_label), CKr = KDF(RK, recv_label)
//!   Role A (username sorted first) sends on "CHAIN_A_TO_B" and receives on
//!   "CHAIN_B_TO_A"; role B the opposite. Each side's sending chain is the
//!   other side's receiving chain, so no handshake message is needed.
//!
//! Symmetric step:
//!   MK_n    = KDF(CK_n, "MSG_" || n)
//!   CK_n+1  = KDF(CK_n, "CHAIN_NEXT")
//!
//! Forward secrecy holds within the session only: there is no DH step, and
//! delivery must be strictly in order. A dropped message desynchronises the
//! receiving chain until `reset`.

use std::collections::VecDeque;
use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::kdf::{self, KEY_LEN};

pub const LABEL_A_TO_B: &str = "CHAIN_A_TO_B";
pub const LABEL_B_TO_A: &str = "CHAIN_B_TO_A";
pub const LABEL_CHAIN_NEXT: &str = "CHAIN_NEXT";

/// Upper bound on fast-forward steps when replaying an own sent message.
/// `header.n` is attacker-controllable once stored, so the O(n) walk is capped.
pub const MAX_REPLAY_STEPS: u64 = 65_536;

/// Sent message keys retained per session for own-message display.
pub const SENT_KEY_CACHE: usize = 256;

fn message_label(n: u64) -> String {
    format!("MSG_{n}")
}

// ── Role ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Username sorts first in the pair.
    A,
    B,
}

impl Role {
    pub fn for_pair(me: &str, friend: &str) -> Self {
        let (first, _) = kdf::sorted_pair(me, friend);
        if me == first {
            Role::A
        } else {
            Role::B
        }
    }

    pub fn sending_label(self) -> &'static str {
        match self {
            Role::A => LABEL_A_TO_B,
            Role::B => LABEL_B_TO_A,
        }
    }

    pub fn receiving_label(self) -> &'static str {
        match self {
            Role::A => LABEL_B_TO_A,
            Role::B => LABEL_A_TO_B,
        }
    }
}

// ── Keys and chain state ─────────────────────────────────────────────────────

/// One-shot AEAD key for a single message.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MessageKey([u8; KEY_LEN]);

impl MessageKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MessageKey(..)")
    }
}

/// A chain key together with the number of steps already taken on it.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ChainState {
    key: [u8; KEY_LEN],
    n: u64,
}

impl ChainState {
    pub fn from_root(root_key: &[u8; KEY_LEN], label: &str) -> Self {
        Self {
            key: kdf::kdf(root_key, label),
            n: 0,
        }
    }

    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Messages already derived from this chain.
    pub fn counter(&self) -> u64 {
        self.n
    }

    /// One symmetric step. Returns the next state and the message key for
    /// index `counter() + 1`; `self` is left untouched.
    #[must_use]
    pub fn advance(&self) -> (ChainState, MessageKey) {
        let message_key = MessageKey(kdf::kdf(&self.key, &message_label(self.n)));
        let next = ChainState {
            key: kdf::kdf(&self.key, LABEL_CHAIN_NEXT),
            n: self.n + 1,
        };
        (next, message_key)
    }

    /// Advance `steps` times (at least once) and return the last message key.
    pub fn fast_forward(&self, steps: u64) -> (ChainState, MessageKey) {
        let (mut state, mut message_key) = self.advance();
        for _ in 1..steps {
            let (next, mk) = state.advance();
            state = next;
            message_key = mk;
        }
        (state, message_key)
    }
}

impl fmt::Debug for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainState").field("n", &self.n).finish_non_exhaustive()
    }
}

/// A receiving step that has been computed but not yet applied.
///
/// Produced by `RatchetSession::prepare_receive`; applied with
/// `RatchetSession::commit_receive` once the message authenticated.
#[derive(Debug)]
pub struct PendingReceive {
    from_counter: u64,
    next: ChainState,
    message_key: MessageKey,
}

impl PendingReceive {
    pub fn message_key(&self) -> &MessageKey {
        &self.message_key
    }

    /// Message index this step decrypts (1-based, equals `Nr` after commit).
    pub fn index(&self) -> u64 {
        self.next.counter()
    }
}

// ── Session state ────────────────────────────────────────────────────────────

struct Chains {
    sending: ChainState,
    receiving: ChainState,
}

impl Chains {
    fn derive(root_key: &[u8; KEY_LEN], role: Role) -> Self {
        Self {
            sending: ChainState::from_root(root_key, role.sending_label()),
            receiving: ChainState::from_root(root_key, role.receiving_label()),
        }
    }
}

/// Ratchet state for one `{me, friend}` conversation, held in memory only.
pub struct RatchetSession {
    me: String,
    friend: String,
    session_id: String,
    role: Role,
    root_key: Option<[u8; KEY_LEN]>,
    chains: Option<Chains>,
    /// Previous chain length; kept for the header, stays 0 without chain replacement.
    pn: u64,
    sent_keys: VecDeque<(u64, MessageKey)>,
}

impl Drop for RatchetSession {
    fn drop(&mut self) {
        if let Some(root) = self.root_key.as_mut() {
            root.zeroize();
        }
    }
}

impl fmt::Debug for RatchetSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RatchetSession")
            .field("me", &self.me)
            .field("friend", &self.friend)
            .field("session_id", &self.session_id)
            .field("role", &self.role)
            .field("ns", &self.ns())
            .field("nr", &self.nr())
            .field("pn", &self.pn)
            .finish_non_exhaustive()
    }
}

impl RatchetSession {
    /// Create an uninitialised session. A missing root key is generated
    /// randomly on `init_chains`.
    pub fn new(me: &str, friend: &str, root_key: Option<[u8; KEY_LEN]>) -> Self {
        let session_id = format!(
            "sess-{me}-{friend}-{}",
            chrono::Utc::now().timestamp_millis()
        );
        Self {
            me: me.to_string(),
            friend: friend.to_string(),
            session_id,
            role: Role::for_pair(me, friend),
            root_key,
            chains: None,
            pn: 0,
            sent_keys: VecDeque::new(),
        }
    }

    pub fn me(&self) -> &str {
        &self.me
    }

    pub fn friend(&self) -> &str {
        &self.friend
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_active(&self) -> bool {
        self.chains.is_some()
    }

    /// Derive both chains from the root key. Runs once; later calls are
    /// no-ops until `reset`.
    pub fn init_chains(&mut self) {
        if self.is_active() {
            return;
        }
        let root = self.root_key.get_or_insert_with(kdf::random_key);
        self.chains = Some(Chains::derive(root, self.role));
        self.pn = 0;
        tracing::debug!(
            target: "danaid_crypto",
            event = "ratchet_init_chains",
            session_id = %self.session_id,
            me = %self.me,
            friend = %self.friend,
            role = ?self.role,
        );
    }

    /// Hard reset: drop both chains (and the sent-key cache) so the next
    /// use re-derives them from the root key.
    pub fn reset(&mut self) {
        self.chains = None;
        self.pn = 0;
        self.sent_keys.clear();
    }

    fn active(&mut self) -> &mut Chains {
        if self.chains.is_none() {
            self.init_chains();
        }
        let role = self.role;
        let root = self.root_key.get_or_insert_with(kdf::random_key);
        self.chains.get_or_insert_with(|| Chains::derive(root, role))
    }

    /// Derive the next sending message key and ratchet the sending chain.
    /// Returns the key and `Ns` after the increment.
    pub fn next_sending_message_key(&mut self) -> (MessageKey, u64) {
        let chains = self.active();
        let (next, message_key) = chains.sending.advance();
        chains.sending = next;
        let index = chains.sending.counter();

        self.sent_keys.push_back((index, message_key.clone()));
        while self.sent_keys.len() > SENT_KEY_CACHE {
            self.sent_keys.pop_front();
        }
        (message_key, index)
    }

    /// Compute the next receiving step without applying it.
    pub fn prepare_receive(&mut self) -> PendingReceive {
        let receiving = &self.active().receiving;
        let (next, message_key) = receiving.advance();
        PendingReceive {
            from_counter: receiving.counter(),
            next,
            message_key,
        }
    }

    /// Apply a step from `prepare_receive`. Fails if the chain moved since.
    pub fn commit_receive(&mut self, pending: PendingReceive) -> Result<u64, CryptoError> {
        let receiving = &mut self.active().receiving;
        if receiving.counter() != pending.from_counter {
            return Err(CryptoError::RatchetStep(format!(
                "stale receive step: chain at {}, step from {}",
                receiving.counter(),
                pending.from_counter
            )));
        }
        *receiving = pending.next;
        Ok(receiving.counter())
    }

    /// Derive the next receiving message key and ratchet the receiving chain.
    /// Returns the key and `Nr` after the increment.
    pub fn next_receiving_message_key(&mut self) -> (MessageKey, u64) {
        let receiving = &mut self.active().receiving;
        let (next, message_key) = receiving.advance();
        *receiving = next;
        (message_key, receiving.counter())
    }

    /// Message key recorded when `n` was sent, if still cached.
    pub fn cached_sent_key(&self, n: u64) -> Option<MessageKey> {
        self.sent_keys
            .iter()
            .find(|(index, _)| *index == n)
            .map(|(_, key)| key.clone())
    }

    /// Recover the key of our own sent message `n` by rebuilding a throwaway
    /// sending chain from `root_key` and walking it `n` steps. The live
    /// session is not touched. `n == 0` is treated as the first message.
    pub fn replay_sent_key(
        me: &str,
        friend: &str,
        root_key: &[u8; KEY_LEN],
        n: u64,
    ) -> Result<MessageKey, CryptoError> {
        let steps = n.max(1);
        if steps > MAX_REPLAY_STEPS {
            return Err(CryptoError::RatchetStep(format!(
                "replay index {steps} exceeds {MAX_REPLAY_STEPS}"
            )));
        }
        let role = Role::for_pair(me, friend);
        let chain = ChainState::from_root(root_key, role.sending_label());
        let (_, message_key) = chain.fast_forward(steps);
        Ok(message_key)
    }

    /// Messages sent on the current chain.
    pub fn ns(&self) -> u64 {
        self.chains.as_ref().map_or(0, |c| c.sending.counter())
    }

    /// Messages received on the current chain.
    pub fn nr(&self) -> u64 {
        self.chains.as_ref().map_or(0, |c| c.receiving.counter())
    }

    pub fn pn(&self) -> u64 {
        self.pn
    }

    pub fn sending_chain(&self) -> Option<&ChainState> {
        self.chains.as_ref().map(|c| &c.sending)
    }

    pub fn receiving_chain(&self) -> Option<&ChainState> {
        self.chains.as_ref().map(|c| &c.receiving)
    }
}
