use std::path::PathBuf;

use thiserror::Error;

use danaid_crypto::CryptoError;
use danaid_proto::ProtoError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Protocol error: {0}")]
    Proto(#[from] ProtoError),

    /// Associated data names the wrong parties or version.
    #[error("Envelope context mismatch: {0}")]
    ContextMismatch(String),

    #[error("Out-of-order message: expected index {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },

    #[error("Decrypted message is not valid UTF-8")]
    InvalidUtf8,

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    /// True for failures that mean the message was tampered with, keyed
    /// differently or addressed to another context; never for local I/O
    /// problems.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ClientError::Crypto(CryptoError::AeadDecrypt) | ClientError::ContextMismatch(_)
        )
    }
}
