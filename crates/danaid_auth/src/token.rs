//! Bearer credentials issued after a successful login.
//!
//! Format: `base64url(claims_json) "." base64url(HMAC-SHA256(secret, first_part))`,
//! unpadded. Claims are `{sub, iat, exp}` in Unix seconds.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::signer::restrict_permissions;
use crate::store::write_atomic;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Username.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenIssuer {
    secret: Option<Zeroizing<Vec<u8>>>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: Option<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()).map(Zeroizing::new),
            ttl,
        }
    }

    /// Secret from `config.token_secret`, else the `token_secret` file in the
    /// keys directory. Neither present leaves the issuer unable to mint.
    pub fn from_config(config: &AuthConfig) -> Self {
        let secret = match &config.token_secret {
            Some(secret) => Some(secret.as_bytes().to_vec()),
            None => match std::fs::read_to_string(config.token_secret_path()) {
                Ok(text) => Some(text.trim().as_bytes().to_vec()),
                Err(e) => {
                    tracing::warn!(
                        target: "danaid_auth",
                        event = "token_secret_missing",
                        path = %config.token_secret_path().display(),
                        error = %e,
                    );
                    None
                }
            },
        };
        Self::new(secret, config.token_ttl())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Write a random 32-byte hex secret to `<keys_dir>/token_secret`.
    /// Returns false if one already exists and `force` is not set.
    pub fn generate_secret_file(config: &AuthConfig, force: bool) -> Result<bool, AuthError> {
        let path = config.token_secret_path();
        if path.exists() && !force {
            return Ok(false);
        }
        let mut secret = Zeroizing::new([0u8; 32]);
        rand::rngs::OsRng.fill_bytes(&mut secret[..]);
        let encoded = Zeroizing::new(hex::encode(&secret[..]));
        write_atomic(&path, encoded.as_bytes())?;
        restrict_permissions(&path);
        tracing::info!(
            target: "danaid_auth",
            event = "token_secret_generated",
            path = %path.display(),
        );
        Ok(true)
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        let secret = self
            .secret
            .as_ref()
            .ok_or_else(|| AuthError::Configuration("token secret not configured".into()))?;
        HmacSha256::new_from_slice(secret)
            .map_err(|e| AuthError::Configuration(format!("token mac init: {e}")))
    }

    pub fn issue(&self, username: &str) -> Result<(String, TokenClaims), AuthError> {
        self.issue_at(username, Utc::now())
    }

    pub fn issue_at(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, TokenClaims), AuthError> {
        let claims = TokenClaims {
            sub: username.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        let mut mac = self.mac()?;
        let claims_json = serde_json::to_vec(&claims).map_err(danaid_proto::ProtoError::from)?;
        let body = URL_SAFE_NO_PAD.encode(claims_json);
        mac.update(body.as_bytes());
        let tag = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok((format!("{body}.{tag}"), claims))
    }

    pub fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.verify_at(token, Utc::now())
    }

    /// Check the MAC first, then expiry. Claims are only parsed from a token
    /// whose MAC is valid.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, AuthError> {
        let mut mac = self.mac()?;
        let (body, tag) = token
            .split_once('.')
            .ok_or(AuthError::CredentialMismatch("token format"))?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| AuthError::CredentialMismatch("token format"))?;

        mac.update(body.as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| AuthError::CredentialMismatch("token signature"))?;

        let claims: TokenClaims = URL_SAFE_NO_PAD
            .decode(body)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or(AuthError::CredentialMismatch("token claims"))?;
        if now.timestamp() >= claims.exp {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(Some(b"test-secret".to_vec()), Duration::hours(1))
    }

    #[test]
    fn issued_token_verifies_with_claims() {
        let (token, claims) = issuer().issue("alice").unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(issuer().verify(&token).unwrap(), claims);
    }

    #[test]
    fn expired_token_is_rejected() {
        let issued = Utc::now() - Duration::hours(2);
        let (token, _) = issuer().issue_at("alice", issued).unwrap();
        assert!(matches!(issuer().verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn tampered_or_foreign_tokens_are_rejected() {
        let (token, _) = issuer().issue("alice").unwrap();
        let (body, tag) = token.split_once('.').unwrap();

        let forged_claims = URL_SAFE_NO_PAD.encode(br#"{"sub":"mallory","iat":0,"exp":99999999999}"#);
        let forged = format!("{forged_claims}.{tag}");
        assert!(matches!(issuer().verify(&forged), Err(AuthError::CredentialMismatch(_))));

        let other = TokenIssuer::new(Some(b"other".to_vec()), Duration::hours(1));
        assert!(other.verify(&token).is_err());

        assert!(issuer().verify(body).is_err());
        assert!(issuer().verify("").is_err());
    }

    #[test]
    fn secret_file_feeds_the_issuer() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuthConfig::rooted_at(dir.path());
        assert!(TokenIssuer::generate_secret_file(&config, false).unwrap());
        assert!(!TokenIssuer::generate_secret_file(&config, false).unwrap());

        let issuer = TokenIssuer::from_config(&config);
        let (token, _) = issuer.issue("alice").unwrap();
        assert_eq!(TokenIssuer::from_config(&config).verify(&token).unwrap().sub, "alice");

        TokenIssuer::generate_secret_file(&config, true).unwrap();
        assert!(TokenIssuer::from_config(&config).verify(&token).is_err());
    }

    #[test]
    fn missing_secret_is_a_configuration_error() {
        let issuer = TokenIssuer::new(None, Duration::hours(1));
        assert!(matches!(issuer.issue("alice"), Err(AuthError::Configuration(_))));
        let empty = TokenIssuer::new(Some(Vec::new()), Duration::hours(1));
        assert!(matches!(empty.verify("a.b"), Err(AuthError::Configuration(_))));
    }
}
