//! Client identity and login material.

use std::path::Path;

use zeroize::Zeroizing;

use danaid_crypto::codec::b64_encode;
use danaid_crypto::identity::IdentityKeyPair;
use danaid_crypto::kdf::{self, PasswordKdfParams, KEY_LEN};
use danaid_proto::api::{LoginFinishRequest, LoginStartResponse, RegisterRequest};
use danaid_proto::{OneTimePreKey, PrekeyBundle};

use crate::error::ClientError;

/// Argon2id password key for `username`. This, base64-encoded, is what the
/// server stores and compares.
pub fn derive_password_key(
    password: &str,
    username: &str,
    params: PasswordKdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, ClientError> {
    Ok(kdf::password_key(password.as_bytes(), username, params)?)
}

/// A user's long-term identity key together with their username.
pub struct ClientIdentity {
    username: String,
    keys: IdentityKeyPair,
}

impl ClientIdentity {
    pub fn generate(username: &str) -> Self {
        Self {
            username: username.to_string(),
            keys: IdentityKeyPair::generate(),
        }
    }

    pub fn from_pem(username: &str, private_pem: &str) -> Result<Self, ClientError> {
        Ok(Self {
            username: username.to_string(),
            keys: IdentityKeyPair::from_pkcs8_pem(private_pem)?,
        })
    }

    pub fn load(username: &str, path: &Path) -> Result<Self, ClientError> {
        let pem = Zeroizing::new(std::fs::read_to_string(path).map_err(|source| {
            ClientError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?);
        Self::from_pem(username, &pem)
    }

    /// Write the private key as PKCS#8 PEM, readable by the owner only.
    pub fn save(&self, path: &Path) -> Result<(), ClientError> {
        let io_err = |source| ClientError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let pem = self.keys.to_pkcs8_pem()?;
        std::fs::write(path, pem.as_bytes()).map_err(io_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(io_err)?;
        }
        Ok(())
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn public_pem(&self) -> Result<String, ClientError> {
        Ok(self.keys.public_pem()?)
    }

    pub fn fingerprint(&self) -> Result<String, ClientError> {
        Ok(self.keys.public().fingerprint()?)
    }

    /// Registration body signed with this identity over the default claims.
    pub fn register_request(&self, derived_key: &[u8]) -> Result<RegisterRequest, ClientError> {
        let mut req = RegisterRequest {
            username: self.username.clone(),
            derived_key_b64: b64_encode(derived_key),
            public_key_pem: self.public_pem()?,
            client_signature_b64: String::new(),
            registration_payload: None,
            prekey_bundle: None,
        };
        req.client_signature_b64 = self.keys.sign_b64(&req.signed_bytes()?);
        Ok(req)
    }

    /// Bundle whose signed prekey is signed by this identity. The prekeys
    /// themselves are opaque text to the server.
    pub fn prekey_bundle(
        &self,
        signed_pre_key_pub: &str,
        one_time_pre_keys: Vec<OneTimePreKey>,
    ) -> PrekeyBundle {
        PrekeyBundle {
            signed_pre_key_pub: signed_pre_key_pub.to_string(),
            signed_pre_key_signature: self.keys.sign_b64(signed_pre_key_pub.as_bytes()),
            one_time_pre_keys,
        }
    }

    /// Signature over the nonce exactly as the server sent it (base64 text).
    pub fn sign_challenge(&self, nonce_b64: &str) -> String {
        self.keys.sign_b64(nonce_b64.as_bytes())
    }

    pub fn login_finish_request(
        &self,
        derived_key: &[u8],
        start: &LoginStartResponse,
    ) -> LoginFinishRequest {
        LoginFinishRequest {
            username: self.username.clone(),
            derived_key_b64: b64_encode(derived_key),
            challenge_id: start.challenge_id.clone(),
            challenge_signature_b64: self.sign_challenge(&start.nonce_b64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use danaid_crypto::identity::IdentityPublicKey;

    fn light() -> PasswordKdfParams {
        PasswordKdfParams {
            m_cost_kib: 64,
            t_cost: 1,
            p_cost: 1,
        }
    }

    #[test]
    fn password_key_depends_on_password_and_username() {
        let a = derive_password_key("hunter2", "alice", light()).unwrap();
        assert_eq!(*a, *derive_password_key("hunter2", "alice", light()).unwrap());
        assert_ne!(*a, *derive_password_key("hunter3", "alice", light()).unwrap());
        assert_ne!(*a, *derive_password_key("hunter2", "alicia", light()).unwrap());
    }

    #[test]
    fn register_request_is_self_signed() {
        let id = ClientIdentity::generate("alice");
        let req = id.register_request(&[1u8; 32]).unwrap();
        let public = IdentityPublicKey::from_pem(&req.public_key_pem).unwrap();
        public
            .verify_b64(&req.signed_bytes().unwrap(), &req.client_signature_b64)
            .unwrap();
    }

    #[test]
    fn prekey_bundle_is_signed_by_the_identity() {
        let id = ClientIdentity::generate("alice");
        let bundle = id.prekey_bundle("spk-text", Vec::new());
        let public = IdentityPublicKey::from_pem(&id.public_pem().unwrap()).unwrap();
        public
            .verify_b64(bundle.signed_bytes(), &bundle.signed_pre_key_signature)
            .unwrap();
        bundle.validate().unwrap();
    }

    #[test]
    fn challenge_signature_covers_the_nonce_text() {
        let id = ClientIdentity::generate("alice");
        let start = LoginStartResponse {
            challenge_id: "00ff".into(),
            nonce_b64: "bm9uY2U=".into(),
        };
        let finish = id.login_finish_request(&[1u8; 32], &start);
        let public = IdentityPublicKey::from_pem(&id.public_pem().unwrap()).unwrap();
        public
            .verify_b64(b"bm9uY2U=", &finish.challenge_signature_b64)
            .unwrap();
        assert_eq!(finish.challenge_id, "00ff");
    }

    #[test]
    fn save_and_load_keep_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities/alice.pem");
        let id = ClientIdentity::generate("alice");
        id.save(&path).unwrap();
        let loaded = ClientIdentity::load("alice", &path).unwrap();
        assert_eq!(loaded.fingerprint().unwrap(), id.fingerprint().unwrap());
        assert!(matches!(
            ClientIdentity::load("alice", &dir.path().join("missing.pem")),
            Err(ClientError::Io { .. })
        ));
    }
}
