use thiserror::Error;

use danaid_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
