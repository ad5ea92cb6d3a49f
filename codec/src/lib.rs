//! Keyed-MAC codecs for the hub.
//!
//! Two capabilities live here:
//! 1. The session-token codec: a `header.body.tag` capability minted at
//!    Execute and presented back at Settle/Cancel.
//! 2. The game request MAC: lowercase-hex HMAC over the literal request
//!    body, keyed by the stored digest of the game's shared secret.
//!
//! All comparisons against attacker-supplied tags are constant time.

use base64::Engine as _;
use openssl::hash::MessageDigest;
use openssl::memcmp;
use openssl::pkey::PKey;
use openssl::sign::Signer;

use pluto_core::auth::GameMacT;
use pluto_core::error::{Error, Result};
use pluto_core::token::{SessionClaims, TokenCodecT, TokenError, TokenResult};

const TOKEN_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

fn base64url_encode(data: &[u8]) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    engine.encode(data)
}

fn base64url_decode(data: &str) -> TokenResult<Vec<u8>> {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    engine.decode(data).map_err(|_| TokenError::Malformed)
}

fn hmac_sha256(
    key: &[u8],
    message: &[u8],
) -> std::result::Result<Vec<u8>, openssl::error::ErrorStack> {
    let pkey = PKey::hmac(key)?;
    let mut signer = Signer::new(MessageDigest::sha256(), &pkey)?;
    signer.update(message)?;
    signer.sign_to_vec()
}

// memcmp::eq requires equal lengths.
fn tags_equal(expected: &[u8], given: &[u8]) -> bool {
    expected.len() == given.len() && memcmp::eq(expected, given)
}

/// One-way digest of a game client secret, as stored in the catalog
/// and used as the MAC key on both sides.
pub fn digest_secret(secret: &str) -> String {
    sha256::digest(secret)
}

/// Mints and verifies session tokens with a process-wide secret.
pub struct HmacTokenCodec {
    secret: Vec<u8>,
}

impl HmacTokenCodec {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
        }
    }
}

impl TokenCodecT for HmacTokenCodec {
    fn mint(&self, claims: &SessionClaims) -> TokenResult<String> {
        let header = base64url_encode(TOKEN_HEADER.as_bytes());
        let body = serde_json::to_vec(claims)
            .map_err(|e| TokenError::EncodeFailed(e.to_string()))?;
        let signing_input = format!("{}.{}", header, base64url_encode(&body));
        let tag = hmac_sha256(&self.secret, signing_input.as_bytes())
            .map_err(|e| TokenError::MacFailed(e.to_string()))?;
        Ok(format!("{}.{}", signing_input, base64url_encode(&tag)))
    }

    fn verify(&self, token: &str) -> TokenResult<SessionClaims> {
        let mut parts = token.split('.');
        let (header, body, tag) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(b), Some(t), None) => (h, b, t),
            _ => return Err(TokenError::Malformed),
        };

        let signing_input = format!("{}.{}", header, body);
        let expected = hmac_sha256(&self.secret, signing_input.as_bytes())
            .map_err(|e| TokenError::MacFailed(e.to_string()))?;
        let given = base64url_decode(tag)?;
        if !tags_equal(&expected, &given) {
            return Err(TokenError::SignatureMismatch);
        }

        if base64url_decode(header)? != TOKEN_HEADER.as_bytes() {
            return Err(TokenError::Malformed);
        }
        let body = base64url_decode(body)?;
        serde_json::from_slice(&body).map_err(|_| TokenError::Malformed)
    }
}

/// Verifier for the `X-Pluto-Signature` MAC of game-backend requests.
pub struct GameMac;

impl GameMacT for GameMac {
    fn sign(&self, secret_digest: &str, body: &[u8]) -> Result<String> {
        let tag = hmac_sha256(secret_digest.as_bytes(), body)
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(hex::encode(tag))
    }

    fn verify(&self, secret_digest: &str, body: &[u8], signature_hex: &str) -> Result<()> {
        let given = hex::decode(signature_hex).map_err(|_| Error::InvalidSignature)?;
        let expected = hmac_sha256(secret_digest.as_bytes(), body)
            .map_err(|e| Error::Internal(e.to_string()))?;
        if tags_equal(&expected, &given) {
            Ok(())
        } else {
            Err(Error::InvalidSignature)
        }
    }
}
