//! Authentication capabilities. The identity provider itself is an
//! external collaborator; the hub only consumes these interfaces.

use async_trait::async_trait;

use crate::error::Result;

/// The verified subject behind a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSubject {
    /// Opaque, stable identifier from the identity provider.
    pub external_id: String,
}

#[async_trait]
pub trait AuthProviderT: Send + Sync {
    /// Verify a bearer token and resolve its subject.
    /// Fails with `InvalidToken` when the token does not verify.
    async fn verify_bearer(&self, token: &str) -> Result<AuthSubject>;
}

/// Keyed-MAC verification of game-backend requests. The key is the
/// stored one-way digest of the game's shared secret, so the raw
/// secret never reaches the hub.
pub trait GameMacT: Send + Sync {
    /// Lowercase hex MAC over the literal request body bytes.
    fn sign(&self, secret_digest: &str, body: &[u8]) -> Result<String>;

    /// Constant-time verification; fails with `InvalidSignature`.
    fn verify(&self, secret_digest: &str, body: &[u8], signature_hex: &str) -> Result<()>;
}
