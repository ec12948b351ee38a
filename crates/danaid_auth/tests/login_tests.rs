use std::sync::Arc;

use chrono::{Duration, Utc};
use danaid_auth::error::AuthErrorKind;
use danaid_auth::signer::generate_key_files;
use danaid_auth::{
    AccountStore, AuthConfig, AuthenticationProtocol, ChallengeStore, IntegritySigner,
    JsonFileAccountStore, MemoryAccountStore, TokenIssuer,
};
use danaid_crypto::codec::{b64_decode, b64_encode};
use danaid_crypto::identity::IdentityKeyPair;
use danaid_proto::api::{LoginFinishRequest, RegisterRequest};
use danaid_proto::AccountRecord;

const DERIVED_KEY: [u8; 32] = [42u8; 32];

fn register(protocol: &AuthenticationProtocol, username: &str) -> IdentityKeyPair {
    let identity = IdentityKeyPair::generate();
    let mut req = RegisterRequest {
        username: username.into(),
        derived_key_b64: b64_encode(DERIVED_KEY),
        public_key_pem: identity.public_pem().unwrap(),
        client_signature_b64: String::new(),
        registration_payload: None,
        prekey_bundle: None,
    };
    req.client_signature_b64 = identity.sign_b64(&req.signed_bytes().unwrap());
    protocol.register(&req).unwrap();
    identity
}

fn finish_request(username: &str, challenge_id: &str, signature_b64: String) -> LoginFinishRequest {
    LoginFinishRequest {
        username: username.into(),
        derived_key_b64: b64_encode(DERIVED_KEY),
        challenge_id: challenge_id.into(),
        challenge_signature_b64: signature_b64,
    }
}

fn file_backed(dir: &std::path::Path) -> (AuthConfig, AuthenticationProtocol) {
    let mut config = AuthConfig::rooted_at(dir);
    config.token_secret = Some("integration-secret".into());
    generate_key_files(&config, false).unwrap();
    let store = Arc::new(JsonFileAccountStore::open(&config.data_dir).unwrap());
    let protocol = AuthenticationProtocol::from_config(&config, store);
    (config, protocol)
}

fn memory_backed() -> AuthenticationProtocol {
    AuthenticationProtocol::new(
        Arc::new(MemoryAccountStore::new()),
        IntegritySigner::from_key_pair(IdentityKeyPair::generate()),
        ChallengeStore::default(),
        TokenIssuer::new(Some(b"secret".to_vec()), Duration::hours(1)),
    )
}

#[test]
fn full_login_issues_a_verifiable_token() {
    let dir = tempfile::tempdir().unwrap();
    let (_, protocol) = file_backed(dir.path());
    let identity = register(&protocol, "alice");

    let start = protocol.start("alice").unwrap();
    let sig = identity.sign_b64(start.nonce_b64.as_bytes());
    let resp = protocol
        .finish(&finish_request("alice", &start.challenge_id, sig))
        .unwrap();

    assert_eq!(resp.username, "alice");
    assert_eq!(resp.identity_key_fingerprint, identity.public().fingerprint().unwrap());
    let claims = protocol.tokens().verify(&resp.token).unwrap();
    assert_eq!(claims.sub, "alice");
    assert_eq!(claims.exp - claims.iat, 3600);
    assert_eq!(claims.exp, resp.expires_at);
}

#[test]
fn record_tampered_between_phases_is_an_integrity_violation() {
    let dir = tempfile::tempdir().unwrap();
    let (_, protocol) = file_backed(dir.path());
    register(&protocol, "alice");
    let start = protocol.start("alice").unwrap();

    // attacker swaps in their own identity key without re-signing
    let path = dir.path().join("users/alice.json");
    let mut json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let mallory = IdentityKeyPair::generate();
    json["identityPublicKey"] = mallory.public_pem().unwrap().into();
    std::fs::write(&path, serde_json::to_vec_pretty(&json).unwrap()).unwrap();

    let sig = mallory.sign_b64(start.nonce_b64.as_bytes());
    let err = protocol
        .finish(&finish_request("alice", &start.challenge_id, sig))
        .unwrap_err();
    assert_eq!(err.kind(), AuthErrorKind::IntegrityViolation);

    // the record stays unusable until repaired
    let start_err = protocol.start("alice").unwrap_err();
    assert_eq!(start_err.kind(), AuthErrorKind::IntegrityViolation);
}

#[test]
fn another_accounts_signed_record_cannot_stand_in() {
    let dir = tempfile::tempdir().unwrap();
    let (_, protocol) = file_backed(dir.path());
    register(&protocol, "alice");
    let mallory = register(&protocol, "mallory");

    // mallory's record is validly signed, just stored under alice's name
    let users = dir.path().join("users");
    std::fs::copy(users.join("mallory.json"), users.join("alice.json")).unwrap();

    assert_eq!(
        protocol.start("alice").unwrap_err().kind(),
        AuthErrorKind::IntegrityViolation
    );

    // holding a challenge for alice does not help either
    let (challenge_id, nonce_b64) = protocol.challenges().create("alice");
    let sig = mallory.sign_b64(nonce_b64.as_bytes());
    let err = protocol
        .finish(&finish_request("alice", &challenge_id, sig))
        .unwrap_err();
    assert_eq!(err.kind(), AuthErrorKind::IntegrityViolation);

    // mallory still logs in as mallory
    let start = protocol.start("mallory").unwrap();
    let sig = mallory.sign_b64(start.nonce_b64.as_bytes());
    let resp = protocol
        .finish(&finish_request("mallory", &start.challenge_id, sig))
        .unwrap();
    assert_eq!(protocol.tokens().verify(&resp.token).unwrap().sub, "mallory");
}

#[test]
fn a_single_changed_field_breaks_the_record() {
    let protocol = memory_backed();
    register(&protocol, "alice");
    let stored = protocol.store().load("alice").unwrap().unwrap();

    let (mut fields, sig) = stored.into_parts();
    fields.password_derived_key = b64_encode([0u8; 32]);
    protocol
        .store()
        .replace(&AccountRecord::from_parts(fields, sig))
        .unwrap();

    assert_eq!(
        protocol.start("alice").unwrap_err().kind(),
        AuthErrorKind::IntegrityViolation
    );
}

#[test]
fn challenge_is_single_use() {
    let protocol = memory_backed();
    let identity = register(&protocol, "alice");
    let start = protocol.start("alice").unwrap();
    let sig = identity.sign_b64(start.nonce_b64.as_bytes());

    protocol
        .finish(&finish_request("alice", &start.challenge_id, sig.clone()))
        .unwrap();
    let replay = protocol
        .finish(&finish_request("alice", &start.challenge_id, sig))
        .unwrap_err();
    assert_eq!(replay.kind(), AuthErrorKind::NotFound);
}

#[test]
fn bad_challenge_signature_consumes_the_challenge() {
    let protocol = memory_backed();
    let identity = register(&protocol, "alice");
    let start = protocol.start("alice").unwrap();

    // signing the decoded nonce bytes instead of the issued text is wrong
    let raw = b64_decode(&start.nonce_b64).unwrap();
    let wrong = identity.sign_b64(&raw);
    let err = protocol
        .finish(&finish_request("alice", &start.challenge_id, wrong))
        .unwrap_err();
    assert_eq!(err.kind(), AuthErrorKind::CredentialMismatch);

    let right = identity.sign_b64(start.nonce_b64.as_bytes());
    let err = protocol
        .finish(&finish_request("alice", &start.challenge_id, right))
        .unwrap_err();
    assert_eq!(err.kind(), AuthErrorKind::NotFound);
}

#[test]
fn expired_challenge_is_reported_as_expired() {
    let protocol = memory_backed();
    let identity = register(&protocol, "alice");

    let (challenge_id, nonce_b64) = protocol
        .challenges()
        .create_at("alice", Utc::now() - Duration::minutes(6));
    let sig = identity.sign_b64(nonce_b64.as_bytes());
    let err = protocol
        .finish(&finish_request("alice", &challenge_id, sig))
        .unwrap_err();
    assert_eq!(err.kind(), AuthErrorKind::Expired);
    assert_eq!(err.public_message(), "authentication failed");
}

#[test]
fn challenge_for_another_account_is_refused() {
    let protocol = memory_backed();
    let alice = register(&protocol, "alice");
    register(&protocol, "bob");

    let bobs = protocol.start("bob").unwrap();
    let sig = alice.sign_b64(bobs.nonce_b64.as_bytes());
    let err = protocol
        .finish(&finish_request("alice", &bobs.challenge_id, sig))
        .unwrap_err();
    assert_eq!(err.kind(), AuthErrorKind::CredentialMismatch);
}

#[test]
fn foreign_identity_key_cannot_log_in() {
    let protocol = memory_backed();
    register(&protocol, "alice");
    let start = protocol.start("alice").unwrap();
    let mallory = IdentityKeyPair::generate();
    let sig = mallory.sign_b64(start.nonce_b64.as_bytes());
    let err = protocol
        .finish(&finish_request("alice", &start.challenge_id, sig))
        .unwrap_err();
    assert_eq!(err.kind(), AuthErrorKind::CredentialMismatch);
}

#[test]
fn missing_server_keys_fail_closed() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AuthConfig::rooted_at(dir.path());
    config.token_secret = Some("s".into());
    let store = Arc::new(JsonFileAccountStore::open(&config.data_dir).unwrap());
    let protocol = AuthenticationProtocol::from_config(&config, store.clone());

    let identity = IdentityKeyPair::generate();
    let mut req = RegisterRequest {
        username: "alice".into(),
        derived_key_b64: b64_encode(DERIVED_KEY),
        public_key_pem: identity.public_pem().unwrap(),
        client_signature_b64: String::new(),
        registration_payload: None,
        prekey_bundle: None,
    };
    req.client_signature_b64 = identity.sign_b64(&req.signed_bytes().unwrap());
    let err = protocol.register(&req).unwrap_err();
    assert_eq!(err.kind(), AuthErrorKind::Configuration);
    assert!(!store.exists("alice").unwrap());
}

#[test]
fn missing_token_secret_blocks_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let config = AuthConfig::rooted_at(dir.path());
    generate_key_files(&config, false).unwrap();
    let store = Arc::new(JsonFileAccountStore::open(&config.data_dir).unwrap());
    let protocol = AuthenticationProtocol::from_config(&config, store);
    let identity = register(&protocol, "alice");

    let start = protocol.start("alice").unwrap();
    let sig = identity.sign_b64(start.nonce_b64.as_bytes());
    let err = protocol
        .finish(&finish_request("alice", &start.challenge_id, sig))
        .unwrap_err();
    assert_eq!(err.kind(), AuthErrorKind::Configuration);
}
