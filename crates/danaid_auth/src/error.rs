use std::path::PathBuf;

use thiserror::Error;

use danaid_crypto::CryptoError;
use danaid_proto::ProtoError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Invalid record name: {0}")]
    InvalidName(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Coarse outcome a transport maps to its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    NotFound,
    IntegrityViolation,
    CredentialMismatch,
    Expired,
    Configuration,
    InvalidRequest,
    AlreadyExists,
    Internal,
}

/// Failures of registration and login. Messages carry detail for logs;
/// callers facing the network should send `public_message()` instead.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Integrity signature mismatch for account {0}")]
    IntegrityViolation(String),

    #[error("Credential mismatch: {0}")]
    CredentialMismatch(&'static str),

    #[error("Challenge expired")]
    Expired,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Protocol error: {0}")]
    Proto(#[from] ProtoError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AlreadyExists(name) => AuthError::AlreadyExists(name),
            StoreError::NotFound(name) => AuthError::NotFound(name),
            StoreError::InvalidName(name) => AuthError::InvalidRequest(format!("username {name}")),
            other => AuthError::Store(other),
        }
    }
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::NotFound(_) => AuthErrorKind::NotFound,
            AuthError::IntegrityViolation(_) => AuthErrorKind::IntegrityViolation,
            AuthError::CredentialMismatch(_) => AuthErrorKind::CredentialMismatch,
            AuthError::Expired => AuthErrorKind::Expired,
            AuthError::Configuration(_) => AuthErrorKind::Configuration,
            AuthError::InvalidRequest(_) => AuthErrorKind::InvalidRequest,
            AuthError::AlreadyExists(_) => AuthErrorKind::AlreadyExists,
            AuthError::Store(_) | AuthError::Proto(_) | AuthError::Crypto(_) => {
                AuthErrorKind::Internal
            }
        }
    }

    /// Generic refusal text. Login failures share one message so the
    /// response does not reveal which check failed.
    pub fn public_message(&self) -> &'static str {
        match self.kind() {
            AuthErrorKind::NotFound
            | AuthErrorKind::CredentialMismatch
            | AuthErrorKind::Expired => "authentication failed",
            AuthErrorKind::InvalidRequest => "invalid request",
            AuthErrorKind::AlreadyExists => "username unavailable",
            AuthErrorKind::IntegrityViolation
            | AuthErrorKind::Configuration
            | AuthErrorKind::Internal => "internal server error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_failures_share_a_public_message() {
        let errors = [
            AuthError::NotFound("challenge".into()),
            AuthError::CredentialMismatch("password"),
            AuthError::CredentialMismatch("signature"),
            AuthError::Expired,
        ];
        for e in &errors {
            assert_eq!(e.public_message(), "authentication failed");
        }
        assert_ne!(errors[0].kind(), errors[3].kind());
    }

    #[test]
    fn store_conflicts_keep_their_kind() {
        let e: AuthError = StoreError::AlreadyExists("alice".into()).into();
        assert_eq!(e.kind(), AuthErrorKind::AlreadyExists);

        let e: AuthError = StoreError::Serialisation(
            serde_json::from_str::<u8>("x").unwrap_err(),
        )
        .into();
        assert_eq!(e.kind(), AuthErrorKind::Internal);
        assert_eq!(e.public_message(), "internal server error");
    }
}
