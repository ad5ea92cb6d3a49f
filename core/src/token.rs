//! The session token is a self-contained capability authorizing
//! Settle/Cancel on one session. Its expiry field is informational;
//! authoritative expiry lives on the session row.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::Amount;
use crate::types::{ContractId, SessionId, UserId};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Signature mismatch")]
    SignatureMismatch,

    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    #[error("Mac failed: {0}")]
    MacFailed(String),
}

impl From<TokenError> for crate::error::Error {
    fn from(_: TokenError) -> Self {
        crate::error::Error::InvalidToken
    }
}

pub type TokenResult<T> = std::result::Result<T, TokenError>;

/// The decoded body of a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub session_id: SessionId,
    pub contract_id: ContractId,
    pub player_ids: Vec<UserId>,
    pub total_pot: Amount,
    /// ISO-8601, informational only.
    pub expires_at: String,
    /// Issued-at, unix seconds.
    pub iat: u64,
}

pub trait TokenCodecT: Send + Sync {
    fn mint(&self, claims: &SessionClaims) -> TokenResult<String>;

    /// Returns the decoded claims iff the tag verifies.
    fn verify(&self, token: &str) -> TokenResult<SessionClaims>;
}
