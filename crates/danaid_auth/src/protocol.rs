//! Registration and the two-phase challenge-response login.
//!
//! ```text
//! client                                   server
//!   start(username)                ──►   load record, verify integrity,
//!                                  ◄──   (challengeId, nonceB64)
//!   sign(nonceB64 text) with IK
//!   finish(username, derivedKey,
//!          challengeId, sig)       ──►   reload + re-verify record,
//!                                        compare derived key (constant time),
//!                                        take challenge, check TTL + owner,
//!                                        verify sig under stored IK
//!                                  ◄──   token + identity fingerprint
//! ```
//!
//! The two phases share no state other than the challenge store. Every
//! failed check aborts the phase; no credential is minted on a partial pass.

use std::sync::Arc;

use chrono::Utc;

use danaid_crypto::codec::b64_decode;
use danaid_crypto::hash::{constant_time_eq, identity_fingerprint};
use danaid_crypto::identity::IdentityPublicKey;
use danaid_proto::api::{
    LoginFinishRequest, LoginFinishResponse, LoginStartResponse, RegisterRequest,
    RegisterResponse,
};
use danaid_proto::{validate_username, AccountFields, AccountRecord};

use crate::challenge::ChallengeStore;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::signer::IntegritySigner;
use crate::store::AccountStore;
use crate::token::TokenIssuer;

/// Shortest accepted base64 text for a password-derived key.
pub const MIN_DERIVED_KEY_B64_LEN: usize = 16;

pub struct AuthenticationProtocol {
    store: Arc<dyn AccountStore>,
    signer: IntegritySigner,
    challenges: ChallengeStore,
    tokens: TokenIssuer,
}

impl AuthenticationProtocol {
    pub fn new(
        store: Arc<dyn AccountStore>,
        signer: IntegritySigner,
        challenges: ChallengeStore,
        tokens: TokenIssuer,
    ) -> Self {
        Self {
            store,
            signer,
            challenges,
            tokens,
        }
    }

    /// Wire everything from configuration: keys from `keys_dir`, TTLs and
    /// the token secret from `config`.
    pub fn from_config(config: &AuthConfig, store: Arc<dyn AccountStore>) -> Self {
        Self::new(
            store,
            IntegritySigner::load(config),
            ChallengeStore::new(config.challenge_ttl()),
            TokenIssuer::from_config(config),
        )
    }

    pub fn store(&self) -> &dyn AccountStore {
        self.store.as_ref()
    }

    pub fn signer(&self) -> &IntegritySigner {
        &self.signer
    }

    pub fn challenges(&self) -> &ChallengeStore {
        &self.challenges
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    // ── Registration ─────────────────────────────────────────────────────────

    pub fn register(&self, req: &RegisterRequest) -> Result<RegisterResponse, AuthError> {
        if req.username.is_empty()
            || req.derived_key_b64.is_empty()
            || req.public_key_pem.is_empty()
            || req.client_signature_b64.is_empty()
        {
            return Err(AuthError::InvalidRequest(
                "username, derivedKeyB64, publicKeyPem and clientSignatureB64 are required".into(),
            ));
        }
        validate_username(&req.username).map_err(|e| AuthError::InvalidRequest(e.to_string()))?;
        if req.derived_key_b64.len() < MIN_DERIVED_KEY_B64_LEN
            || b64_decode(&req.derived_key_b64).is_err()
        {
            return Err(AuthError::InvalidRequest("derivedKeyB64".into()));
        }
        let identity_key = IdentityPublicKey::from_pem(&req.public_key_pem)
            .map_err(|e| AuthError::InvalidRequest(e.to_string()))?;

        if self.store.exists(&req.username)? {
            return Err(AuthError::AlreadyExists(req.username.clone()));
        }

        let signed = req.signed_bytes()?;
        if identity_key
            .verify_b64(&signed, &req.client_signature_b64)
            .is_err()
        {
            tracing::warn!(
                target: "danaid_auth",
                event = "register_bad_client_signature",
                username = %req.username,
            );
            return Err(AuthError::CredentialMismatch("client signature"));
        }

        if let Some(bundle) = &req.prekey_bundle {
            bundle
                .validate()
                .map_err(|e| AuthError::InvalidRequest(e.to_string()))?;
            if identity_key
                .verify_b64(bundle.signed_bytes(), &bundle.signed_pre_key_signature)
                .is_err()
            {
                tracing::warn!(
                    target: "danaid_auth",
                    event = "register_bad_signed_prekey",
                    username = %req.username,
                );
                return Err(AuthError::CredentialMismatch("signed prekey"));
            }
        }

        let now = Utc::now().timestamp_millis();
        let fingerprint = identity_fingerprint(&req.public_key_pem);
        let record = self.signer.seal(AccountFields {
            username: req.username.clone(),
            password_derived_key: req.derived_key_b64.clone(),
            identity_public_key: req.public_key_pem.clone(),
            identity_key_fingerprint: fingerprint.clone(),
            prekey_bundle: req.prekey_bundle.clone(),
            created_at: now,
            updated_at: now,
        })?;
        self.store.insert_new(&record)?;

        tracing::info!(
            target: "danaid_auth",
            event = "account_registered",
            username = %req.username,
            fingerprint = %fingerprint,
            prekey_bundle = req.prekey_bundle.is_some(),
        );
        Ok(RegisterResponse {
            username: req.username.clone(),
            identity_key_fingerprint: fingerprint,
            has_prekey_bundle: req.prekey_bundle.is_some(),
        })
    }

    /// Rewrite an account through the signer; the stored record is replaced
    /// only with a fully re-signed version.
    pub fn update_account(
        &self,
        username: &str,
        edit: impl FnOnce(&mut AccountFields),
    ) -> Result<AccountRecord, AuthError> {
        let current = self.load_verified(username)?;
        let amended = self.signer.amend(&current, edit)?;
        self.store.replace(&amended)?;
        tracing::info!(
            target: "danaid_auth",
            event = "account_updated",
            username = %username,
        );
        Ok(amended)
    }

    // ── Login ────────────────────────────────────────────────────────────────

    /// Load a record and check its integrity signature. The signed username
    /// must be the one looked up, so a validly signed record of another
    /// account stored under this name is refused.
    pub fn load_verified(&self, username: &str) -> Result<AccountRecord, AuthError> {
        let record = self
            .store
            .load(username)?
            .ok_or_else(|| AuthError::NotFound(format!("account {username}")))?;
        if !self.signer.verify_record(&record) {
            tracing::error!(
                target: "danaid_auth",
                event = "integrity_violation",
                username = %username,
                "stored account record failed integrity verification",
            );
            return Err(AuthError::IntegrityViolation(username.to_string()));
        }
        if record.username() != username {
            tracing::error!(
                target: "danaid_auth",
                event = "integrity_violation",
                username = %username,
                signed_username = %record.username(),
                "stored account record belongs to another account",
            );
            return Err(AuthError::IntegrityViolation(username.to_string()));
        }
        Ok(record)
    }

    /// Phase 1: issue a challenge bound to `username`.
    pub fn start(&self, username: &str) -> Result<LoginStartResponse, AuthError> {
        if username.is_empty() {
            return Err(AuthError::InvalidRequest("username is required".into()));
        }
        self.load_verified(username)?;

        self.challenges.purge_expired();
        let (challenge_id, nonce_b64) = self.challenges.create(username);
        tracing::info!(
            target: "danaid_auth",
            event = "login_challenge_issued",
            username = %username,
            challenge_id = %challenge_id,
        );
        Ok(LoginStartResponse {
            challenge_id,
            nonce_b64,
        })
    }

    /// Phase 2: prove the password-derived key and possession of the
    /// identity key; mint a credential.
    pub fn finish(&self, req: &LoginFinishRequest) -> Result<LoginFinishResponse, AuthError> {
        if req.username.is_empty()
            || req.derived_key_b64.is_empty()
            || req.challenge_id.is_empty()
            || req.challenge_signature_b64.is_empty()
        {
            return Err(AuthError::InvalidRequest(
                "username, derivedKeyB64, challengeId and challengeSignatureB64 are required".into(),
            ));
        }

        let record = self.load_verified(&req.username)?;

        let stored_key = record.fields().password_derived_key_bytes()?;
        let candidate = b64_decode(&req.derived_key_b64)
            .map_err(|_| AuthError::CredentialMismatch("password"))?;
        if !constant_time_eq(&stored_key, &candidate) {
            tracing::warn!(
                target: "danaid_auth",
                event = "login_rejected",
                username = %req.username,
                reason = "password",
            );
            return Err(AuthError::CredentialMismatch("password"));
        }

        let challenge = self.challenges.take(&req.challenge_id)?;
        if self.challenges.is_expired(&challenge) {
            tracing::warn!(
                target: "danaid_auth",
                event = "login_rejected",
                username = %req.username,
                reason = "challenge_expired",
            );
            return Err(AuthError::Expired);
        }
        if challenge.username != req.username {
            tracing::warn!(
                target: "danaid_auth",
                event = "login_rejected",
                username = %req.username,
                reason = "challenge_owner",
            );
            return Err(AuthError::CredentialMismatch("challenge owner"));
        }

        let identity_key = IdentityPublicKey::from_pem(record.identity_public_key())?;
        if identity_key
            .verify_b64(challenge.nonce_b64.as_bytes(), &req.challenge_signature_b64)
            .is_err()
        {
            tracing::warn!(
                target: "danaid_auth",
                event = "login_rejected",
                username = %req.username,
                reason = "challenge_signature",
            );
            return Err(AuthError::CredentialMismatch("challenge signature"));
        }

        let (token, claims) = self.tokens.issue(&req.username)?;
        tracing::info!(
            target: "danaid_auth",
            event = "login_succeeded",
            username = %req.username,
            expires_at = claims.exp,
        );
        Ok(LoginFinishResponse {
            username: req.username.clone(),
            token,
            expires_at: claims.exp,
            identity_key_fingerprint: record.identity_key_fingerprint().to_string(),
        })
    }
}
